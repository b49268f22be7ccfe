//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the raw addresses handled by the kernel's
//! memory core. [`VirtualAddress`] and [`PhysicalAddress`] are zero-cost
//! `u64` newtypes that keep the two address kinds from being mixed up at
//! compile time; [`PAGE_SIZE`] and the `align_*` helpers describe the 4 KiB
//! granule every allocator in the kernel works in.
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xFFFF_E000_0000_1234);
//! assert_eq!(va.align_down(PAGE_SIZE).as_u64(), 0xFFFF_E000_0000_1000);
//! assert!(!va.is_aligned(PAGE_SIZE));
//!
//! let pa = PhysicalAddress::new(0x0030_0000);
//! assert!(pa.is_aligned(PAGE_SIZE));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod physical_address;
mod virtual_address;

pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// log2 of the base page size.
pub const PAGE_SHIFT: u32 = 12;

/// Base page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Align `x` down to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two.
///
/// ```rust
/// # use kernel_memory_addresses::align_down;
/// assert_eq!(align_down(4095, 4096), 0);
/// assert_eq!(align_down(8191, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_down(x: u64, a: u64) -> u64 {
    x & !(a - 1)
}

/// Align `x` up to the nearest multiple of `a`.
///
/// `a` must be a non-zero power of two and `x + a - 1` must not overflow.
///
/// ```rust
/// # use kernel_memory_addresses::align_up;
/// assert_eq!(align_up(1, 4096), 4096);
/// assert_eq!(align_up(4096, 4096), 4096);
/// ```
#[inline(always)]
#[must_use]
pub const fn align_up(x: u64, a: u64) -> u64 {
    (x + a - 1) & !(a - 1)
}

/// Round a byte length up to whole pages.
#[inline(always)]
#[must_use]
pub const fn page_align_len(len: usize) -> usize {
    (len + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(page_align_len(1) == PAGE_SIZE);
    assert!(page_align_len(PAGE_SIZE) == PAGE_SIZE);
};
