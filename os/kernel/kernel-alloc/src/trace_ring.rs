//! # Allocation trace ring buffer
//!
//! A byte ring of length-prefixed records over storage the caller owns.
//! Producers [`enqueue`](LogRingBuffer::enqueue) records; a reader walks them
//! with [`dequeue_at`](LogRingBuffer::dequeue_at) using monotonic byte
//! pointers, so a slow reader notices when the producer lapped it instead of
//! reading torn data.
//!
//! ```text
//! ptr:     tail                                  head
//!           │                                     │
//!           ▼                                     ▼
//!  ... ─────┬────────┬────────────┬───────────────┬──── (mod capacity)
//!           │ len │ payload │ len │ payload │ ... │
//! ```
//!
//! Every record is an 8-byte little-endian length followed by the payload.
//! When a new record does not fit, the oldest records are evicted.

use core::ptr::NonNull;
use kernel_sync::SpinMutex;

const HEADER: usize = size_of::<u64>();

/// Outcome of [`LogRingBuffer::dequeue_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeueResult {
    /// A record was copied out.
    pub success: bool,
    /// Pointer of the record that was read. Differs from the requested
    /// pointer when records were overwritten before the reader got to them.
    pub record_ptr: u64,
    /// Pointer of the following record; when `success` is false, the pointer
    /// the next record will be written at.
    pub next_ptr: u64,
    /// Full length of the record. Larger than the caller's buffer if the
    /// copy was truncated.
    pub actual_size: usize,
}

struct Cursor {
    /// Pointer of the oldest surviving record.
    tail: u64,
    /// Pointer the next record is written at.
    head: u64,
}

pub struct LogRingBuffer {
    storage: NonNull<u8>,
    capacity: usize,
    cursor: SpinMutex<Cursor>,
}

// The storage is only touched with the cursor lock held.
unsafe impl Send for LogRingBuffer {}
unsafe impl Sync for LogRingBuffer {}

impl LogRingBuffer {
    /// Creates a ring over `[storage, storage + capacity)`. The storage is not
    /// touched until the first record is written.
    ///
    /// # Safety
    /// The range must be valid for reads and writes, and owned by the ring,
    /// for as long as the ring is used.
    #[must_use]
    pub const unsafe fn new(storage: NonNull<u8>, capacity: usize) -> Self {
        Self {
            storage,
            capacity,
            cursor: SpinMutex::new(Cursor { tail: 0, head: 0 }),
        }
    }

    /// Creates a ring over a buffer the caller gives up for good.
    #[must_use]
    pub fn from_static(storage: &'static mut [u8]) -> Self {
        let capacity = storage.len();
        // SAFETY: the slice is exclusively ours for 'static.
        unsafe { Self::new(NonNull::from(storage).cast(), capacity) }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `record`, evicting the oldest records as needed. Records that
    /// cannot fit into the ring at all are dropped.
    #[allow(clippy::cast_possible_truncation)]
    pub fn enqueue(&self, record: &[u8]) {
        let total = HEADER + record.len();
        if total > self.capacity {
            return;
        }

        let mut cursor = self.cursor.lock_irq();
        while (cursor.head - cursor.tail) as usize + total > self.capacity {
            let evicted = self.read_len(cursor.tail);
            cursor.tail += (HEADER + evicted) as u64;
        }

        let head = cursor.head;
        self.copy_in(head, &(record.len() as u64).to_le_bytes());
        self.copy_in(head + HEADER as u64, record);
        cursor.head += total as u64;
    }

    /// Copies the record at `ptr` into `buffer`.
    ///
    /// Starts at the oldest surviving record if `ptr` was already
    /// overwritten. Returns `success == false` if no record exists at or
    /// after `ptr` yet.
    pub fn dequeue_at(&self, ptr: u64, buffer: &mut [u8]) -> DequeueResult {
        let cursor = self.cursor.lock_irq();

        let ptr = ptr.max(cursor.tail);
        if ptr >= cursor.head {
            return DequeueResult {
                success: false,
                record_ptr: ptr,
                next_ptr: cursor.head,
                actual_size: 0,
            };
        }

        let len = self.read_len(ptr);
        let copied = len.min(buffer.len());
        self.copy_out(ptr + HEADER as u64, &mut buffer[..copied]);

        DequeueResult {
            success: true,
            record_ptr: ptr,
            next_ptr: ptr + (HEADER + len) as u64,
            actual_size: len,
        }
    }

    fn read_len(&self, ptr: u64) -> usize {
        let mut header = [0u8; HEADER];
        self.copy_out(ptr, &mut header);
        usize::try_from(u64::from_le_bytes(header)).unwrap_or(usize::MAX)
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn offset(&self, ptr: u64) -> usize {
        (ptr % self.capacity as u64) as usize
    }

    fn copy_in(&self, ptr: u64, src: &[u8]) {
        let start = self.offset(ptr);
        let first = src.len().min(self.capacity - start);
        // SAFETY: both halves stay inside `[storage, storage + capacity)`,
        // which the ring owns; callers hold the cursor lock.
        unsafe {
            let base = self.storage.as_ptr();
            core::ptr::copy_nonoverlapping(src.as_ptr(), base.add(start), first);
            core::ptr::copy_nonoverlapping(src[first..].as_ptr(), base, src.len() - first);
        }
    }

    fn copy_out(&self, ptr: u64, dst: &mut [u8]) {
        let start = self.offset(ptr);
        let first = dst.len().min(self.capacity - start);
        let len = dst.len();
        // SAFETY: as in `copy_in`.
        unsafe {
            let base = self.storage.as_ptr();
            core::ptr::copy_nonoverlapping(base.add(start), dst.as_mut_ptr(), first);
            core::ptr::copy_nonoverlapping(base, dst[first..].as_mut_ptr(), len - first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(capacity: usize) -> LogRingBuffer {
        LogRingBuffer::from_static(Box::leak(vec![0u8; capacity].into_boxed_slice()))
    }

    fn read_all(ring: &LogRingBuffer, mut ptr: u64) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let r = ring.dequeue_at(ptr, &mut buf);
            if !r.success {
                return out;
            }
            out.push(buf[..r.actual_size].to_vec());
            ptr = r.next_ptr;
        }
    }

    #[test]
    fn records_come_back_in_order() {
        let ring = ring(128);
        ring.enqueue(b"alloc 0x1000");
        ring.enqueue(b"free 0x1000");
        assert_eq!(read_all(&ring, 0), vec![b"alloc 0x1000".to_vec(), b"free 0x1000".to_vec()]);
    }

    #[test]
    fn reader_at_head_waits() {
        let ring = ring(64);
        ring.enqueue(b"abc");
        let r = ring.dequeue_at(11, &mut [0u8; 8]);
        assert!(!r.success);
        assert_eq!(r.next_ptr, 11);
    }

    #[test]
    fn overwritten_records_are_skipped() {
        let ring = ring(48);
        // Each record takes 8 + 8 bytes; the fourth evicts the first.
        for i in 0..4u64 {
            ring.enqueue(&i.to_le_bytes());
        }

        let mut buf = [0u8; 8];
        let r = ring.dequeue_at(0, &mut buf);
        assert!(r.success);
        assert_eq!(r.record_ptr, 16, "reader must notice the lost record");
        assert_eq!(u64::from_le_bytes(buf), 1);

        let rest = read_all(&ring, r.next_ptr);
        assert_eq!(rest, vec![2u64.to_le_bytes().to_vec(), 3u64.to_le_bytes().to_vec()]);
    }

    #[test]
    fn records_wrap_around_the_storage() {
        let ring = ring(44);
        ring.enqueue(&[1; 12]); // ptr 0..20
        ring.enqueue(&[2; 12]); // ptr 20..40
        ring.enqueue(&[3; 12]); // ptr 40..60, payload wraps to offset 0
        assert_eq!(read_all(&ring, 0), vec![vec![2; 12], vec![3; 12]]);
    }

    #[test]
    fn short_buffers_truncate() {
        let ring = ring(64);
        ring.enqueue(b"0123456789");
        let mut buf = [0u8; 4];
        let r = ring.dequeue_at(0, &mut buf);
        assert!(r.success);
        assert_eq!(r.actual_size, 10);
        assert_eq!(&buf, b"0123");
        assert_eq!(r.next_ptr, 18);
    }

    #[test]
    fn oversized_records_are_dropped() {
        let ring = ring(16);
        ring.enqueue(&[0xAA; 9]);
        assert!(!ring.dequeue_at(0, &mut [0u8; 16]).success);
    }
}
