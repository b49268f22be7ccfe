//! # Direct physical memory window
//!
//! Memory the kernel owns only physically (page-table frames, the deferred
//! unmap closure) is touched through a window that maps all of physical
//! memory at a fixed offset. [`PhysMapper`] turns a physical address into a
//! pointer inside that window.
//!
//! ## Why is this needed?
//! - Code can only dereference virtual addresses, never physical ones.
//! - The window differs between the kernel (HHDM) and host tests (identity
//!   over real host allocations), so the translation is a trait.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::{HhdmPhysMapper, PhysMapper};
//! use kernel_info::memory::HHDM_BASE;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let p = HhdmPhysMapper.phys_to_ptr(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(p as u64, HHDM_BASE + 0x1234_0000);
//! ```

use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::PhysicalAddress;

/// Translates physical addresses into pointers the CPU can dereference.
pub trait PhysMapper: Sync {
    /// Pointer to the first byte of `pa` in the physical window.
    ///
    /// Computing the pointer is safe; dereferencing it is only sound for
    /// physical memory the caller owns.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// Every physical address `pa` is visible at `HHDM_BASE + pa`.
///
/// # Safety
/// - The HHDM mapping must be present and cover the referenced physical range.
/// - The returned pointer must only be used for valid, mapped, and writable memory.
#[derive(Debug, Copy, Clone, Default)]
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        (HHDM_BASE + pa.as_u64()) as *mut u8
    }
}
