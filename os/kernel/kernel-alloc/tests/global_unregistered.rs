//! The kernel-wide services in a process that never wires any backends.

use kernel_alloc::{alloc_trace_ring, kernel_virtual_alloc, kernel_virtual_memory};
use kernel_info::memory::ALLOC_TRACE_SIZE;

#[test]
#[should_panic(expected = "used before its backends were registered")]
fn arena_requires_registered_backends() {
    kernel_virtual_memory();
}

#[test]
#[should_panic(expected = "used before its backends were registered")]
fn virtual_alloc_requires_registered_backends() {
    kernel_virtual_alloc();
}

#[test]
fn trace_ring_spans_the_trace_window() {
    let ring = alloc_trace_ring();
    assert_eq!(ring.capacity() as u64, ALLOC_TRACE_SIZE);
    assert!(std::ptr::eq(ring, alloc_trace_ring()));
}
