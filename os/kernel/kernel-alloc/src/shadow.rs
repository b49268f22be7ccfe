//! Shadow memory hooks for address sanitizing.
//!
//! The arena marks reserved ranges accessible and returned ranges
//! inaccessible. What "marking" means is up to the sanitizer runtime the
//! kernel was built with; kernels without one use [`NoShadow`].

/// Byte-range validity marking consulted by a memory-safety checker.
pub trait ShadowMemory: Sync {
    /// Marks `[address, address + size)` inaccessible.
    fn poison(&self, address: *const u8, size: usize);

    /// Marks `[address, address + size)` accessible.
    fn unpoison(&self, address: *const u8, size: usize);

    /// Resets the shadow of `[address, address + size)` to "never tracked",
    /// used when a slab grows into a range whose old markings are stale.
    fn clean(&self, address: *const u8, size: usize);
}

/// Shadow hooks that do nothing.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoShadow;

impl ShadowMemory for NoShadow {
    #[inline]
    fn poison(&self, _address: *const u8, _size: usize) {}

    #[inline]
    fn unpoison(&self, _address: *const u8, _size: usize) {}

    #[inline]
    fn clean(&self, _address: *const u8, _size: usize) {}
}
