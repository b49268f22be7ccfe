use core::fmt;
use core::ops::{Add, AddAssign};

/// Virtual memory address.
///
/// Carries only the *kind* of address at the type level; canonicality is not
/// checked. Kernel heap addresses handed out by the arena are always of this
/// type.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The address as a raw pointer.
    ///
    /// Dereferencing it is only sound while the address is mapped.
    #[inline]
    #[must_use]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned(self, align: usize) -> bool {
        self.0 & (align as u64 - 1) == 0
    }

    #[inline]
    #[must_use]
    pub const fn align_down(self, align: usize) -> Self {
        Self(crate::align_down(self.0, align as u64))
    }

    #[inline]
    #[must_use]
    pub const fn align_up(self, align: usize) -> Self {
        Self(crate::align_up(self.0, align as u64))
    }

    /// Byte distance from `base` to `self`. `base` must not lie above `self`.
    #[inline]
    #[must_use]
    pub const fn offset_from(self, base: Self) -> u64 {
        self.0 - base.0
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
