mod common;

use common::{Harness, ShadowOp, WINDOW};
use kernel_alloc::{
    KernelVirtualMemory, KernelVmConfig, KernelVmConfigError, MemoryBackends, PhysicalFrameAlloc,
};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress};
use std::collections::BTreeSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn granule(length: usize) -> usize {
    length.max(1).next_power_of_two().max(PAGE_SIZE)
}

#[test]
fn metadata_is_backed_at_the_window_tail() {
    let h = Harness::new();

    let tail = h.window + (WINDOW - PAGE_SIZE) as u64;
    assert!(h.page_space.translate(tail).is_some());
    assert_eq!(h.page_space.mapped_in(h.window, WINDOW), 1);
    assert_eq!(h.frames.used_pages(), 1);
    assert_eq!(h.arena.max_order(), 8);
    assert_eq!(h.virtual_bytes(), 0);

    assert_eq!(
        h.shadow.take(),
        vec![ShadowOp::Unpoison(tail.as_u64(), PAGE_SIZE)]
    );
}

#[test]
fn allocations_are_aligned_and_inside_the_window() {
    let h = Harness::new();
    let end = h.window.as_u64() + h.available() as u64;

    let lengths = [1, PAGE_SIZE, PAGE_SIZE + 1, 0x2000, 0x3000, 0x1_0000, 0x10_0000];
    let mut live = Vec::new();
    let mut reserved = 0;
    for len in lengths {
        let a = h.arena.allocate(len);
        let g = granule(len);
        assert!(a.is_aligned(g), "{a:?} not aligned to {g:#x}");
        assert!(a >= h.window && a.as_u64() + g as u64 <= end);

        reserved += g;
        assert_eq!(h.virtual_bytes(), reserved);
        live.push((a, len));
    }

    let distinct: BTreeSet<_> = live.iter().map(|(a, _)| *a).collect();
    assert_eq!(distinct.len(), live.len());

    for (a, len) in live {
        h.arena.deallocate(a, len);
    }
    assert_eq!(h.virtual_bytes(), 0);
}

#[test]
fn freed_ranges_are_reused() {
    let h = Harness::new();

    let a = h.arena.allocate(0x2000);
    h.arena.deallocate(a, 0x2000);
    assert_eq!(h.virtual_bytes(), 0);

    assert_eq!(h.arena.allocate(0x2000), a);
    assert_eq!(h.virtual_bytes(), 0x2000);
}

#[test]
fn shadow_follows_reservation() {
    let h = Harness::new();
    h.shadow.take();

    let a = h.arena.allocate(0x1800);
    h.arena.deallocate(a, 0x1800);

    assert_eq!(
        h.shadow.take(),
        vec![
            ShadowOp::Unpoison(a.as_u64(), 0x2000),
            ShadowOp::Poison(a.as_u64(), 0x2000),
        ]
    );
}

#[test]
#[should_panic(expected = "too large to be satisfied (order 9 while buddy order is 8)")]
fn oversized_request_is_fatal() {
    let h = Harness::new();
    h.arena.allocate(0x20_0000);
}

#[test]
#[should_panic(expected = "too large to be satisfied (order 52 while buddy order is 8)")]
fn length_near_address_space_size_is_fatal() {
    let h = Harness::new();
    h.arena.allocate(usize::MAX);
}

#[test]
#[should_panic(expected = "out of kernel virtual memory")]
fn exhaustion_is_fatal() {
    let h = Harness::new();
    for _ in 0..3 {
        h.arena.allocate(0x10_0000);
    }
    h.arena.allocate(PAGE_SIZE);
}

#[test]
fn bad_windows_are_rejected_before_touching_memory() {
    let h = Harness::new();
    let backends: MemoryBackends = *h.arena.backends();

    let config = KernelVmConfig {
        base: VirtualAddress::new(0x1234_5000),
        size: WINDOW,
        table_order: None,
    };
    assert!(matches!(
        KernelVirtualMemory::new(config, backends),
        Err(KernelVmConfigError::UnalignedBase)
    ));
    assert_eq!(h.frames.used_pages(), 1);
}

#[test]
fn concurrent_allocations_never_overlap() {
    let h = Harness::new();
    let arena = h.arena;

    let threads = 6;
    let rounds = 200;
    let start = Arc::new(Barrier::new(threads));
    let live = Arc::new(Mutex::new(BTreeSet::new()));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let start = Arc::clone(&start);
            let live = Arc::clone(&live);
            thread::spawn(move || {
                start.wait();
                let len = PAGE_SIZE << (t % 3);
                for _ in 0..rounds {
                    let a = arena.allocate(len);
                    assert!(live.lock().unwrap().insert(a), "{a:?} handed out twice");
                    thread::yield_now();
                    assert!(live.lock().unwrap().remove(&a));
                    arena.deallocate(a, len);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(h.virtual_bytes(), 0);
}
