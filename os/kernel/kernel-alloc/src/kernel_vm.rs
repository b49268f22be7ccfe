//! # Kernel Virtual Memory Arena
//!
//! Owns one fixed window of kernel address space and carves power-of-two
//! ranges out of it with a [`BuddyAccessor`]. The buddy metadata lives at
//! the tail of the window itself, backed by physical frames when the arena is
//! constructed, so the arena never needs an allocator to describe itself.
//!
//! ```text
//! base                                   base + available      base + size
//! ├───────────── handed out in blocks ───────────┼──── buddy tables ────┤
//! ```
//!
//! Both operations disable local interrupts and then take the arena lock.

use crate::buddy::BuddyAccessor;
use crate::config::KernelVmConfig;
use crate::error::{KernelVmConfigError, KernelVmError, fatal};
use crate::page_space::{CachingMode, KernelPageSpace, PageAccess, PhysicalFrameAlloc};
use crate::phys_mapper::PhysMapper;
use crate::shadow::ShadowMemory;
use crate::usage::MemoryUsage;
use core::ptr::NonNull;
use kernel_memory_addresses::{PAGE_SHIFT, PAGE_SIZE, VirtualAddress};
use kernel_sync::SpinMutex;
use log::{error, info};

/// Alignment requested from the buddy allocator for every block.
const BLOCK_ALIGNMENT: usize = 64;

/// The collaborators the memory core is wired to.
///
/// All of them are kernel-lifetime services; copies of this bundle are handed
/// to everything that maps, frees or translates memory.
#[derive(Clone, Copy)]
pub struct MemoryBackends {
    pub frames: &'static dyn PhysicalFrameAlloc,
    pub page_space: &'static dyn KernelPageSpace,
    pub phys: &'static dyn PhysMapper,
    pub shadow: &'static dyn ShadowMemory,
}

pub struct KernelVirtualMemory {
    base: VirtualAddress,
    size: usize,
    backends: MemoryBackends,
    usage: MemoryUsage,
    buddy: SpinMutex<BuddyAccessor>,
}

/// Smallest order whose block covers `length` bytes.
#[must_use]
pub const fn order_for_length(length: usize) -> u32 {
    let pages = length.div_ceil(PAGE_SIZE);
    if pages <= 1 {
        return 0;
    }
    // At most 2^52 pages, so this cannot overflow.
    pages.next_power_of_two().trailing_zeros()
}

impl KernelVirtualMemory {
    /// Sets up the arena over `config`'s window.
    ///
    /// Backs the buddy metadata at the tail of the window with fresh frames
    /// and marks every block free. Halts if physical memory runs out while
    /// doing so.
    ///
    /// # Errors
    /// The window described by `config` is unusable.
    pub fn new(
        config: KernelVmConfig,
        backends: MemoryBackends,
    ) -> Result<Self, KernelVmConfigError> {
        let layout = config.layout()?;
        let table = config.base + layout.available as u64;

        for offset in (0..layout.overhead).step_by(PAGE_SIZE) {
            let Some(frame) = backends.frames.allocate(PAGE_SIZE) else {
                fatal(KernelVmError::OutOfPhysicalMemory);
            };
            backends.page_space.map_single_4k(
                table + offset as u64,
                frame,
                PageAccess::WRITE,
                CachingMode::Null,
            );
        }
        backends.shadow.unpoison(table.as_mut_ptr::<u8>(), layout.overhead);

        let Some(storage) = NonNull::new(table.as_mut_ptr::<i8>()) else {
            unreachable!("a validated window does not end at address zero");
        };
        let mut buddy = BuddyAccessor::new();
        // SAFETY: the metadata pages were just mapped and belong to nobody else.
        unsafe {
            buddy.initialize(config.base.as_u64(), storage, layout.num_roots, layout.table_order);
        }

        info!(
            "kernel-vm: arena at {} ({} MiB), buddy order {}, {} roots, {} KiB metadata",
            config.base,
            config.size >> 20,
            layout.table_order,
            layout.num_roots,
            layout.overhead >> 10
        );

        Ok(Self {
            base: config.base,
            size: config.size,
            backends,
            usage: MemoryUsage::new(),
            buddy: SpinMutex::new(buddy),
        })
    }

    /// Reserves at least `length` bytes.
    ///
    /// The returned address is aligned to the size of the buddy block that
    /// backs it, and the whole block is counted as reserved. Halts if the
    /// request is larger than a root block or the arena is exhausted.
    pub fn allocate(&self, length: usize) -> VirtualAddress {
        let mut buddy = self.buddy.lock_irq();

        let order = order_for_length(length);
        if order > buddy.table_order() {
            fatal(KernelVmError::TooLarge {
                order,
                max_order: buddy.table_order(),
            });
        }

        let Some(address) = buddy.allocate(order, BLOCK_ALIGNMENT) else {
            error!("kernel-vm: failed to allocate {length:#x} bytes of kernel virtual memory");
            error!(
                "kernel-vm: physical usage: {} KiB, kernel VM: {} KiB, kernel RSS: {} KiB",
                self.backends.frames.used_pages() * 4,
                self.usage.virtual_bytes() / 1024,
                self.usage.resident_bytes() / 1024
            );
            fatal(KernelVmError::OutOfVirtualMemory { length });
        };

        let granule = 1usize << (PAGE_SHIFT + order);
        self.usage.add_virtual(granule);

        let address = VirtualAddress::new(address);
        self.backends.shadow.unpoison(address.as_mut_ptr::<u8>(), granule);
        address
    }

    /// Returns a range obtained from [`allocate`](Self::allocate) with the same
    /// `length`.
    pub fn deallocate(&self, address: VirtualAddress, length: usize) {
        let mut buddy = self.buddy.lock_irq();

        let order = order_for_length(length);
        if order > buddy.table_order() {
            fatal(KernelVmError::TooLarge {
                order,
                max_order: buddy.table_order(),
            });
        }
        let granule = 1usize << (PAGE_SHIFT + order);

        self.backends.shadow.poison(address.as_mut_ptr::<u8>(), granule);
        buddy.free(address.as_u64(), order);
        self.usage.sub_virtual(granule);
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Window size, including the metadata tail.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Largest order a single allocation may have.
    #[must_use]
    pub fn max_order(&self) -> u32 {
        self.buddy.lock_irq().table_order()
    }

    #[must_use]
    pub const fn usage(&self) -> &MemoryUsage {
        &self.usage
    }

    #[must_use]
    pub const fn backends(&self) -> &MemoryBackends {
        &self.backends
    }
}
