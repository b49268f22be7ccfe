//! Kernel-wide instances of the arena, the virtual allocator and the
//! allocation trace ring.
//!
//! Boot code wires the collaborators once with [`register_backends`]; the
//! arena itself is built on first use, the same way the heap reaches it.

use crate::config::KernelVmConfig;
use crate::kernel_vm::{KernelVirtualMemory, MemoryBackends};
use crate::trace_ring::LogRingBuffer;
use crate::virtual_alloc::KernelVirtualAlloc;
use core::ptr::NonNull;
use kernel_info::memory::{ALLOC_TRACE_BASE, ALLOC_TRACE_SIZE};
use kernel_sync::SyncOnceCell;

static BACKENDS: SyncOnceCell<MemoryBackends> = SyncOnceCell::new();
static KERNEL_VIRTUAL_MEMORY: SyncOnceCell<KernelVirtualMemory> = SyncOnceCell::new();
static KERNEL_VIRTUAL_ALLOC: SyncOnceCell<KernelVirtualAlloc> = SyncOnceCell::new();
static ALLOC_TRACE: SyncOnceCell<LogRingBuffer> = SyncOnceCell::new();

/// Wires the global arena to its collaborators.
///
/// # Errors
/// Hands `backends` back if they were registered before.
pub fn register_backends(backends: MemoryBackends) -> Result<(), MemoryBackends> {
    BACKENDS.set(backends)
}

/// The kernel's arena over [`KernelVmConfig::default`], built on first use.
///
/// # Panics
/// If [`register_backends`] has not been called, or the compiled-in layout
/// is unusable.
pub fn kernel_virtual_memory() -> &'static KernelVirtualMemory {
    // Before the cell: a panicking initializer would leave it wedged.
    let Some(backends) = BACKENDS.get() else {
        panic!("kernel virtual memory used before its backends were registered");
    };
    KERNEL_VIRTUAL_MEMORY.get_or_init(|| {
        match KernelVirtualMemory::new(KernelVmConfig::default(), *backends) {
            Ok(arena) => arena,
            Err(e) => panic!("kernel virtual memory layout: {e}"),
        }
    })
}

/// The kernel heap's page source, tracing into [`alloc_trace_ring`].
///
/// # Panics
/// As [`kernel_virtual_memory`].
pub fn kernel_virtual_alloc() -> &'static KernelVirtualAlloc {
    let arena = kernel_virtual_memory();
    KERNEL_VIRTUAL_ALLOC
        .get_or_init(|| KernelVirtualAlloc::new(arena).with_trace_ring(alloc_trace_ring()))
}

/// The ring over the allocation trace window.
///
/// The window is mapped by the boot loader; the ring does not touch it until
/// the first record is written.
pub fn alloc_trace_ring() -> &'static LogRingBuffer {
    ALLOC_TRACE.get_or_init(|| {
        #[allow(clippy::cast_possible_truncation)]
        let size = ALLOC_TRACE_SIZE as usize;
        let Some(storage) = NonNull::new(ALLOC_TRACE_BASE as *mut u8) else {
            unreachable!("the allocation trace window is not at address zero");
        };
        // SAFETY: the window is reserved for this ring in the kernel layout.
        unsafe { LogRingBuffer::new(storage, size) }
    })
}
