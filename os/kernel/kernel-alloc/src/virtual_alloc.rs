//! # Kernel Virtual Allocator
//!
//! Page-granular backing store for the kernel heap. [`KernelVirtualAlloc::map`]
//! reserves a range from the [`KernelVirtualMemory`] arena and backs every
//! page with a fresh frame; [`KernelVirtualAlloc::unmap`] tears the mappings
//! down and frees the frames right away, but hands the *virtual* range back
//! to the arena only after every CPU has dropped its stale translations.
//!
//! The bookkeeping for that deferred release cannot come from the heap (the
//! heap is what is being freed), so it lives in a single physical page
//! reached through the physical window:
//!
//! ```text
//!   unmap ──► frame F ◄── placement-write UnmapClosure { node, this_page: F }
//!               │
//!               └── submit_shootdown(&node) ──► ... all CPUs acked
//!                                                     │
//!            arena.deallocate(range) ◄── complete ◄───┘
//!            drop closure in place
//!            free F (last, nothing reads F afterwards)
//! ```

use crate::error::{KernelVmError, fatal};
use crate::kernel_vm::KernelVirtualMemory;
use crate::page_space::{CachingMode, PageAccess, ShootNode};
use crate::trace_ring::LogRingBuffer;
use core::ptr::NonNull;
use core::sync::atomic::{Ordering, compiler_fence};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress, page_align_len};

/// Completion state of one deferred unmap, stored inside its own frame.
#[repr(C)]
struct UnmapClosure {
    // Must stay first: the completion casts the node pointer back.
    node: ShootNode,
    this_page: PhysicalAddress,
    arena: &'static KernelVirtualMemory,
}

const _: () = assert!(size_of::<UnmapClosure>() <= PAGE_SIZE);

impl UnmapClosure {
    /// Returns the range to the arena, destroys the closure and releases the
    /// frame it lives in.
    ///
    /// # Safety
    /// `node` must be the `node` field of a live, placement-constructed
    /// closure that has not completed yet.
    unsafe fn complete(node: NonNull<ShootNode>) {
        let closure = node.cast::<Self>();

        // SAFETY: the node is the first field of a live closure (caller contract).
        let (arena, this_page) = unsafe {
            let c = closure.as_ref();
            c.arena.deallocate(c.node.address, c.node.size);
            (c.arena, c.this_page)
        };

        // SAFETY: the closure is not read again; its frame is freed below.
        unsafe { closure.drop_in_place() };
        compiler_fence(Ordering::SeqCst);

        arena.backends().frames.free(this_page, PAGE_SIZE);
    }
}

/// The kernel heap's view of the arena.
#[derive(Clone, Copy)]
pub struct KernelVirtualAlloc {
    arena: &'static KernelVirtualMemory,
    trace: Option<&'static LogRingBuffer>,
}

impl KernelVirtualAlloc {
    #[must_use]
    pub const fn new(arena: &'static KernelVirtualMemory) -> Self {
        Self { arena, trace: None }
    }

    /// Routes [`output_trace`](Self::output_trace) records into `ring`.
    #[must_use]
    pub const fn with_trace_ring(mut self, ring: &'static LogRingBuffer) -> Self {
        self.trace = Some(ring);
        self
    }

    #[must_use]
    pub const fn arena(&self) -> &'static KernelVirtualMemory {
        self.arena
    }

    /// Reserves and backs `length` bytes of kernel memory.
    ///
    /// Every page gets its own writable frame. Halts if either virtual or
    /// physical memory is exhausted; never returns a partially backed range.
    pub fn map(&self, length: usize) -> VirtualAddress {
        let address = self.arena.allocate(length);
        let backends = self.arena.backends();

        // The slab layer unpoisons what it hands out itself.
        backends.shadow.poison(address.as_mut_ptr::<u8>(), length);

        for offset in (0..length).step_by(PAGE_SIZE) {
            let Some(frame) = backends.frames.allocate(PAGE_SIZE) else {
                fatal(KernelVmError::OutOfPhysicalMemory);
            };
            backends.page_space.map_single_4k(
                address + offset as u64,
                frame,
                PageAccess::WRITE,
                CachingMode::Null,
            );
        }
        self.arena.usage().add_resident(page_align_len(length));

        address
    }

    /// Unmaps `[address, address + length)` and frees its frames.
    ///
    /// The range goes back to the arena once the TLB shootdown completes,
    /// which may be before this returns or long after.
    pub fn unmap(&self, address: VirtualAddress, length: usize) {
        if !address.is_aligned(PAGE_SIZE) || !length.is_multiple_of(PAGE_SIZE) {
            fatal(KernelVmError::Misaligned { address, length });
        }
        let backends = self.arena.backends();

        // The slab layer poisons what it gives back itself.
        backends.shadow.unpoison(address.as_mut_ptr::<u8>(), length);

        for offset in (0..length).step_by(PAGE_SIZE) {
            let frame = backends.page_space.unmap_single_4k(address + offset as u64);
            backends.frames.free(frame, PAGE_SIZE);
        }
        self.arena.usage().sub_resident(length);

        let Some(page) = backends.frames.allocate(PAGE_SIZE) else {
            fatal(KernelVmError::OutOfPhysicalMemory);
        };
        let Some(slot) = NonNull::new(backends.phys.phys_to_ptr(page).cast::<UnmapClosure>()) else {
            fatal(KernelVmError::OutOfPhysicalMemory);
        };

        // SAFETY: the frame was just allocated and is reachable through the
        // physical window; nobody else knows about it.
        unsafe {
            slot.write(UnmapClosure {
                node: ShootNode {
                    address,
                    size: length,
                    complete: UnmapClosure::complete,
                },
                this_page: page,
                arena: self.arena,
            });

            let node = slot.cast::<ShootNode>();
            if backends.page_space.submit_shootdown(node) {
                ShootNode::complete(node);
            }
        }
    }

    /// Marks `[pointer, pointer + size)` inaccessible in the shadow memory.
    pub fn poison(&self, pointer: *const u8, size: usize) {
        self.arena.backends().shadow.poison(pointer, size);
    }

    /// Marks `[pointer, pointer + size)` accessible in the shadow memory.
    pub fn unpoison(&self, pointer: *const u8, size: usize) {
        self.arena.backends().shadow.unpoison(pointer, size);
    }

    /// Drops stale shadow markings of a range a slab grows into.
    pub fn unpoison_expand(&self, pointer: *const u8, size: usize) {
        self.arena.backends().shadow.clean(pointer, size);
    }

    /// Appends an allocation trace record.
    ///
    /// Only records anything when built with the `trace-allocations` feature
    /// and a trace ring is attached.
    pub fn output_trace(&self, record: &[u8]) {
        if cfg!(feature = "trace-allocations")
            && let Some(ring) = self.trace
        {
            ring.enqueue(record);
        }
    }
}
