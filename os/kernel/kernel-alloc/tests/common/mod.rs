//! Host-side stand-ins for the collaborators of the kernel virtual memory core.
//!
//! "Physical" frames are real 4 KiB-aligned host allocations and the physical
//! window is the identity, so the deferred-unmap closure is written into real
//! memory. The arena window is a host allocation aligned to its own size.

#![allow(dead_code)]

use kernel_alloc::{
    CachingMode, KernelPageSpace, KernelVirtualAlloc, KernelVirtualMemory, KernelVmConfig,
    MemoryBackends, PageAccess, PhysMapper, PhysicalFrameAlloc, ShadowMemory, ShootNode,
};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::{BTreeMap, BTreeSet};
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const WINDOW: usize = 4 * 1024 * 1024;

fn page_layout() -> Layout {
    Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap()
}

/// Hands out real host pages as frames.
#[derive(Default)]
pub struct HostFrames {
    outstanding: Mutex<BTreeSet<u64>>,
    exhausted: AtomicBool,
}

impl HostFrames {
    /// Makes every further allocation fail.
    pub fn exhaust(&self) {
        self.exhausted.store(true, Ordering::SeqCst);
    }

    pub fn is_outstanding(&self, frame: PhysicalAddress) -> bool {
        self.outstanding.lock().unwrap().contains(&frame.as_u64())
    }
}

impl PhysicalFrameAlloc for HostFrames {
    fn allocate(&self, size: usize) -> Option<PhysicalAddress> {
        assert_eq!(size, PAGE_SIZE);
        if self.exhausted.load(Ordering::SeqCst) {
            return None;
        }
        let p = unsafe { alloc_zeroed(page_layout()) };
        assert!(!p.is_null());
        let pa = p as u64;
        self.outstanding.lock().unwrap().insert(pa);
        Some(PhysicalAddress::new(pa))
    }

    fn free(&self, frame: PhysicalAddress, size: usize) {
        assert_eq!(size, PAGE_SIZE);
        let known = self.outstanding.lock().unwrap().remove(&frame.as_u64());
        assert!(known, "freeing a frame that was never handed out: {frame:?}");
        unsafe { dealloc(frame.as_u64() as *mut u8, page_layout()) };
    }

    fn used_pages(&self) -> usize {
        self.outstanding.lock().unwrap().len()
    }
}

pub struct IdentityPhys;

impl PhysMapper for IdentityPhys {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        pa.as_u64() as *mut u8
    }
}

/// Records mappings; shootdowns either finish synchronously or wait for
/// [`release_shootdowns`](Self::release_shootdowns).
#[derive(Default)]
pub struct RecordingPageSpace {
    mappings: Mutex<BTreeMap<u64, PhysicalAddress>>,
    hold_shootdowns: AtomicBool,
    held: Mutex<Vec<usize>>,
    submitted: AtomicUsize,
}

impl RecordingPageSpace {
    pub fn hold_shootdowns(&self, hold: bool) {
        self.hold_shootdowns.store(hold, Ordering::SeqCst);
    }

    /// Completes every held shootdown, oldest first.
    pub fn release_shootdowns(&self) -> usize {
        let held = std::mem::take(&mut *self.held.lock().unwrap());
        for &node in &held {
            unsafe { ShootNode::complete(NonNull::new(node as *mut ShootNode).unwrap()) };
        }
        held.len()
    }

    /// `(address, size)` of every held shootdown node.
    pub fn held_ranges(&self) -> Vec<(VirtualAddress, usize)> {
        self.held
            .lock()
            .unwrap()
            .iter()
            .map(|&node| {
                let node = unsafe { &*(node as *const ShootNode) };
                (node.address, node.size)
            })
            .collect()
    }

    /// Raw pointers of the held nodes.
    pub fn held_nodes(&self) -> Vec<u64> {
        self.held.lock().unwrap().iter().map(|&n| n as u64).collect()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn mapped_in(&self, start: VirtualAddress, len: usize) -> usize {
        self.mappings
            .lock()
            .unwrap()
            .range(start.as_u64()..start.as_u64() + len as u64)
            .count()
    }

    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.mappings.lock().unwrap().get(&va.as_u64()).copied()
    }
}

impl KernelPageSpace for RecordingPageSpace {
    fn map_single_4k(
        &self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        access: PageAccess,
        caching: CachingMode,
    ) {
        assert!(va.is_aligned(PAGE_SIZE) && pa.is_aligned(PAGE_SIZE));
        assert_eq!(access, PageAccess::WRITE);
        assert_eq!(caching, CachingMode::Null);
        let prev = self.mappings.lock().unwrap().insert(va.as_u64(), pa);
        assert!(prev.is_none(), "{va:?} mapped twice");
    }

    fn unmap_single_4k(&self, va: VirtualAddress) -> PhysicalAddress {
        self.mappings
            .lock()
            .unwrap()
            .remove(&va.as_u64())
            .unwrap_or_else(|| panic!("{va:?} is not mapped"))
    }

    unsafe fn submit_shootdown(&self, node: NonNull<ShootNode>) -> bool {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        if self.hold_shootdowns.load(Ordering::SeqCst) {
            self.held.lock().unwrap().push(node.as_ptr() as usize);
            false
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowOp {
    Poison(u64, usize),
    Unpoison(u64, usize),
    Clean(u64, usize),
}

#[derive(Default)]
pub struct RecordingShadow {
    ops: Mutex<Vec<ShadowOp>>,
}

impl RecordingShadow {
    pub fn take(&self) -> Vec<ShadowOp> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }
}

impl ShadowMemory for RecordingShadow {
    fn poison(&self, address: *const u8, size: usize) {
        self.ops.lock().unwrap().push(ShadowOp::Poison(address as u64, size));
    }

    fn unpoison(&self, address: *const u8, size: usize) {
        self.ops.lock().unwrap().push(ShadowOp::Unpoison(address as u64, size));
    }

    fn clean(&self, address: *const u8, size: usize) {
        self.ops.lock().unwrap().push(ShadowOp::Clean(address as u64, size));
    }
}

/// One arena over a fresh host window, with handles to all fakes.
pub struct Harness {
    pub window: VirtualAddress,
    pub frames: &'static HostFrames,
    pub page_space: &'static RecordingPageSpace,
    pub shadow: &'static RecordingShadow,
    pub arena: &'static KernelVirtualMemory,
    pub alloc: KernelVirtualAlloc,
}

impl Harness {
    pub fn new() -> Self {
        let layout = Layout::from_size_align(WINDOW, WINDOW).unwrap();
        let window = unsafe { alloc_zeroed(layout) };
        assert!(!window.is_null());
        let window = VirtualAddress::from_ptr(window);

        let frames: &'static HostFrames = Box::leak(Box::default());
        let page_space: &'static RecordingPageSpace = Box::leak(Box::default());
        let shadow: &'static RecordingShadow = Box::leak(Box::default());

        let backends = MemoryBackends {
            frames,
            page_space,
            phys: &IdentityPhys,
            shadow,
        };
        let config = KernelVmConfig {
            base: window,
            size: WINDOW,
            table_order: None,
        };
        let arena: &'static KernelVirtualMemory =
            Box::leak(Box::new(KernelVirtualMemory::new(config, backends).unwrap()));

        Self {
            window,
            frames,
            page_space,
            shadow,
            arena,
            alloc: KernelVirtualAlloc::new(arena),
        }
    }

    /// Bytes callers can receive from the 4 MiB window (three 1 MiB roots).
    pub const fn available(&self) -> usize {
        WINDOW - 1024 * 1024
    }

    pub fn virtual_bytes(&self) -> usize {
        self.arena.usage().virtual_bytes()
    }

    pub fn resident_bytes(&self) -> usize {
        self.arena.usage().resident_bytes()
    }
}
