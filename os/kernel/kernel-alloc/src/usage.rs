use core::sync::atomic::{AtomicUsize, Ordering};

/// Kernel memory usage counters.
///
/// `virtual_bytes` counts whole buddy granules reserved from the arena,
/// `resident_bytes` counts bytes backed by physical frames. Resident memory
/// always lies inside reserved memory, so `resident <= virtual` holds whenever
/// no `map`/`unmap` is in flight.
#[derive(Debug, Default)]
pub struct MemoryUsage {
    virtual_bytes: AtomicUsize,
    resident_bytes: AtomicUsize,
}

impl MemoryUsage {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            virtual_bytes: AtomicUsize::new(0),
            resident_bytes: AtomicUsize::new(0),
        }
    }

    /// Bytes reserved from the arena.
    pub fn virtual_bytes(&self) -> usize {
        self.virtual_bytes.load(Ordering::Relaxed)
    }

    /// Bytes backed by physical frames.
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_virtual(&self, bytes: usize) {
        self.virtual_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn sub_virtual(&self, bytes: usize) {
        let prev = self.virtual_bytes.fetch_sub(bytes, Ordering::Relaxed);
        assert!(prev >= bytes, "kernel virtual usage underflow");
    }

    pub(crate) fn add_resident(&self, bytes: usize) {
        self.resident_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn sub_resident(&self, bytes: usize) {
        let prev = self.resident_bytes.fetch_sub(bytes, Ordering::Relaxed);
        assert!(prev >= bytes, "kernel resident usage underflow");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_both_kinds() {
        let usage = MemoryUsage::new();
        usage.add_virtual(0x4000);
        usage.add_resident(0x3000);
        usage.sub_resident(0x1000);
        assert_eq!(usage.virtual_bytes(), 0x4000);
        assert_eq!(usage.resident_bytes(), 0x2000);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    fn virtual_underflow_is_caught() {
        let usage = MemoryUsage::new();
        usage.add_virtual(0x1000);
        usage.sub_virtual(0x2000);
    }
}
