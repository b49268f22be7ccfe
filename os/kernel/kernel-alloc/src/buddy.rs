//! # Flat tree-of-maxima buddy allocator
//!
//! The arena's window is split into `num_roots` equally sized root blocks of
//! order `table_order`; each root is the top of a complete binary tree whose
//! leaves are single pages. Every tree node stores one signed byte: the
//! largest order that is still free somewhere in its subtree, or `-1` if
//! nothing is free.
//!
//! The trees are stored level by level, all roots side by side:
//!
//! ```text
//! level 0  | r0 | r1 | r2 |                         (order = table_order)
//! level 1  | r0.0 r0.1 | r1.0 r1.1 | r2.0 r2.1 |     (order = table_order - 1)
//! ...
//! ```
//!
//! so level `l` holds `num_roots << l` nodes starting at byte
//! `num_roots * (2^l - 1)`, and node `i` of level `l` covers the block at
//! `base + i * (PAGE_SIZE << (table_order - l))`. The allocator keeps no lock;
//! the owner serializes access.

use core::ptr::NonNull;
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE};

/// Largest tree order [`BuddyAccessor::suitable_order`] will pick.
pub const MAX_TABLE_ORDER: u32 = 16;

/// Minimum number of roots [`BuddyAccessor::suitable_order`] aims for.
pub const MIN_ROOTS: usize = 4;

/// Node value of a subtree without any free block.
const NONE_FREE: i8 = -1;

pub struct BuddyAccessor {
    base: u64,
    table: Option<NonNull<i8>>,
    num_roots: usize,
    table_order: u32,
}

// The table is only reached through `&mut self`; whoever owns the accessor
// also owns the metadata pages.
unsafe impl Send for BuddyAccessor {}

impl Default for BuddyAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuddyAccessor {
    /// An accessor without storage. Every allocation fails until
    /// [`initialize`](Self::initialize) is called.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base: 0,
            table: None,
            num_roots: 0,
            table_order: 0,
        }
    }

    /// Picks the largest order not above [`MAX_TABLE_ORDER`] that still splits
    /// `num_pages` into at least [`MIN_ROOTS`] roots.
    #[must_use]
    pub const fn suitable_order(num_pages: usize) -> u32 {
        let mut order = MAX_TABLE_ORDER;
        while order > 0 && (num_pages >> order) < MIN_ROOTS {
            order -= 1;
        }
        order
    }

    /// Bytes of metadata needed for `num_roots` trees of order `table_order`.
    #[must_use]
    pub const fn determine_size(num_roots: usize, table_order: u32) -> usize {
        num_roots * ((1usize << (table_order + 1)) - 1)
    }

    /// Binds the accessor to `storage` and marks every block free.
    ///
    /// # Safety
    /// `storage` must be valid for writes of
    /// [`determine_size(num_roots, table_order)`](Self::determine_size) bytes
    /// and stay exclusively owned by this accessor for its whole lifetime.
    pub unsafe fn initialize(
        &mut self,
        base: u64,
        storage: NonNull<i8>,
        num_roots: usize,
        table_order: u32,
    ) {
        assert!(table_order <= MAX_TABLE_ORDER, "buddy order out of range");

        self.base = base;
        self.table = Some(storage);
        self.num_roots = num_roots;
        self.table_order = table_order;

        for level in 0..=table_order {
            let free = Self::full_value(table_order, level);
            let start = Self::level_offset(num_roots, level);
            let len = num_roots << level;
            // SAFETY: the caller provides `determine_size` bytes of storage.
            unsafe {
                core::ptr::write_bytes(storage.as_ptr().add(start), free.cast_unsigned(), len);
            }
        }
    }

    /// Largest order this allocator can hand out.
    #[must_use]
    pub const fn table_order(&self) -> u32 {
        self.table_order
    }

    #[must_use]
    pub const fn num_roots(&self) -> usize {
        self.num_roots
    }

    /// Allocates one block of `order`, lowest address first.
    ///
    /// Blocks are aligned to their own size relative to the base, so
    /// `alignment` must not exceed the block size. Returns `None` when no
    /// free block of that order exists.
    pub fn allocate(&mut self, order: u32, alignment: usize) -> Option<u64> {
        assert!(alignment.is_power_of_two());
        if order > self.table_order {
            return None;
        }
        assert!(
            alignment <= PAGE_SIZE << order,
            "buddy blocks are only aligned to their own size"
        );
        let wanted = i8::try_from(order).ok()?;

        let root = (0..self.num_roots).find(|&r| self.get(0, r) >= wanted)?;

        let target = self.table_order - order;
        let mut index = root;
        for level in 1..=target {
            let left = index << 1;
            index = if self.get(level, left) >= wanted {
                left
            } else {
                left + 1
            };
        }

        debug_assert_eq!(self.get(target, index), wanted);
        self.set(target, index, NONE_FREE);
        self.propagate(target, index);

        Some(self.base + ((index as u64) << (PAGE_SHIFT + order)))
    }

    /// Returns a block obtained from [`allocate`](Self::allocate) with the same
    /// `order`. Buddies coalesce on the way up.
    pub fn free(&mut self, address: u64, order: u32) {
        assert!(order <= self.table_order, "buddy order out of range");
        assert!(address >= self.base, "address below the buddy base");

        let offset = address - self.base;
        let index = usize::try_from(offset >> (PAGE_SHIFT + order)).unwrap_or(usize::MAX);
        let target = self.table_order - order;
        assert!(
            index < self.num_roots << target,
            "address above the buddy range"
        );
        assert_eq!(
            offset & ((1 << (PAGE_SHIFT + order)) - 1),
            0,
            "address is not aligned to its order"
        );
        assert_eq!(self.get(target, index), NONE_FREE, "double free of buddy block");

        self.set(target, index, Self::full_value(self.table_order, target));
        self.propagate(target, index);
    }

    /// Largest order currently free anywhere, or `None` if the arena is full.
    #[must_use]
    pub fn largest_free_order(&self) -> Option<u32> {
        (0..self.num_roots)
            .map(|r| self.get(0, r))
            .max()
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Recomputes the ancestors of node `index` on `level`.
    fn propagate(&mut self, mut level: u32, mut index: usize) {
        while level > 0 {
            level -= 1;
            index >>= 1;

            let left = self.get(level + 1, index << 1);
            let right = self.get(level + 1, (index << 1) + 1);
            let child_full = Self::full_value(self.table_order, level + 1);

            let value = if left == child_full && right == child_full {
                Self::full_value(self.table_order, level)
            } else {
                left.max(right)
            };
            self.set(level, index, value);
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    const fn full_value(table_order: u32, level: u32) -> i8 {
        (table_order - level) as i8
    }

    const fn level_offset(num_roots: usize, level: u32) -> usize {
        num_roots * ((1usize << level) - 1)
    }

    fn slot(&self, level: u32, index: usize) -> *mut i8 {
        debug_assert!(index < self.num_roots << level);
        let Some(table) = self.table else {
            unreachable!("buddy accessor used before initialization");
        };
        // SAFETY: index is within the level, which lies within the table.
        unsafe {
            table
                .as_ptr()
                .add(Self::level_offset(self.num_roots, level) + index)
        }
    }

    fn get(&self, level: u32, index: usize) -> i8 {
        // SAFETY: `slot` stays inside the table set up by `initialize`.
        unsafe { self.slot(level, index).read() }
    }

    fn set(&mut self, level: u32, index: usize, value: i8) {
        // SAFETY: as in `get`; `&mut self` excludes concurrent access.
        unsafe { self.slot(level, index).write(value) }
    }
}
