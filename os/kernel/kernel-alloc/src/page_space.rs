//! # Collaborators the memory core maps and backs pages through
//!
//! The kernel virtual memory arena does not own page tables or physical
//! memory. It reaches both through the two traits in this module:
//!
//! - [`PhysicalFrameAlloc`] hands out and takes back 4 KiB physical frames.
//! - [`KernelPageSpace`] installs and removes single 4 KiB mappings in the
//!   kernel half of the address space and runs TLB shootdowns.
//!
//! Both are used from any CPU with interrupts disabled, so every method takes
//! `&self` and implementations synchronize internally.

use bitfield_struct::bitfield;
use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Source of physical page frames.
pub trait PhysicalFrameAlloc: Sync {
    /// Allocates `size` bytes of physically contiguous memory, or `None` when
    /// physical memory is exhausted.
    fn allocate(&self, size: usize) -> Option<PhysicalAddress>;

    /// Returns memory obtained from [`allocate`](Self::allocate).
    fn free(&self, frame: PhysicalAddress, size: usize);

    /// Number of 4 KiB pages currently handed out.
    fn used_pages(&self) -> usize;
}

/// Access rights of a kernel mapping.
///
/// Kernel mappings are always readable; only the additional rights are
/// encoded.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct PageAccess {
    /// Writes are permitted.
    pub write: bool,
    /// Instruction fetches are permitted.
    pub execute: bool,
    #[bits(6, default = 0)]
    _reserved_2_7: u8,
}

impl PageAccess {
    /// Read/write, no execute: the rights every heap page gets.
    pub const WRITE: Self = Self::new().with_write(true);
}

/// Cache policy of a mapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum CachingMode {
    /// The architecture's default (write-back on x86-64).
    #[default]
    Null,
    Uncached,
    WriteCombine,
    WriteThrough,
    WriteBack,
}

/// Intrusive node handed to [`KernelPageSpace::submit_shootdown`].
///
/// The page space keeps the node (and whatever embeds it) alive by pointer
/// until every CPU has invalidated `[address, address + size)`, then calls
/// `complete` exactly once. Embedders must place the node first in a
/// `#[repr(C)]` struct so the completion can recover the outer object.
#[repr(C)]
pub struct ShootNode {
    pub address: VirtualAddress,
    pub size: usize,
    pub complete: unsafe fn(NonNull<ShootNode>),
}

impl ShootNode {
    /// Runs the node's completion.
    ///
    /// # Safety
    /// `node` must point to a live node whose completion has not run yet.
    /// The node must not be touched afterwards.
    pub unsafe fn complete(node: NonNull<Self>) {
        unsafe {
            let complete = node.as_ref().complete;
            complete(node);
        }
    }
}

/// The kernel half of the page tables.
pub trait KernelPageSpace: Sync {
    /// Maps one 4 KiB page. The virtual page must currently be unmapped.
    fn map_single_4k(
        &self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        access: PageAccess,
        caching: CachingMode,
    );

    /// Removes one 4 KiB mapping and returns the frame it pointed to.
    fn unmap_single_4k(&self, va: VirtualAddress) -> PhysicalAddress;

    /// Starts a TLB shootdown for the node's range.
    ///
    /// Returns `true` if the shootdown finished synchronously; the page space
    /// then never invokes the node and the caller completes it. Otherwise the
    /// page space calls [`ShootNode::complete`] later, from whatever context
    /// acknowledges the last CPU.
    ///
    /// # Safety
    /// `node` must stay valid and unmodified until it is completed.
    unsafe fn submit_shootdown(&self, node: NonNull<ShootNode>) -> bool;
}
