//! Failure taxonomy of the kernel virtual memory core.
//!
//! Nothing in the arena or the virtual allocator hands an error back to its
//! caller: kernel-internal allocations have no fallback, so every condition
//! in [`KernelVmError`] ends in [`fatal`]. The only recoverable error is
//! [`KernelVmConfigError`], which is reported before any allocator state
//! exists.

use kernel_memory_addresses::VirtualAddress;
use log::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelVmError {
    #[error(
        "kernel virtual memory allocation is too large to be satisfied (order {order} while buddy order is {max_order})"
    )]
    TooLarge { order: u32, max_order: u32 },
    #[error("out of kernel virtual memory (failed to allocate {length:#x} bytes)")]
    OutOfVirtualMemory { length: usize },
    #[error("out of physical memory while backing kernel memory")]
    OutOfPhysicalMemory,
    #[error("unmap of {address} with length {length:#x} is not page aligned")]
    Misaligned {
        address: VirtualAddress,
        length: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelVmConfigError {
    #[error("the window base is not aligned to the largest block size")]
    UnalignedBase,
    #[error("the window size is not a multiple of the page size")]
    SizeNotPageMultiple,
    #[error("the window is too small to hold a single root block and its metadata")]
    WindowTooSmall,
    #[error("the requested table order exceeds the buddy allocator's maximum")]
    TableOrderTooLarge,
}

/// Reports `err` and halts.
///
/// The kernel's panic handler stops the machine; under a test harness the
/// panic is the observable "fatal" signal.
#[cold]
#[track_caller]
pub fn fatal(err: KernelVmError) -> ! {
    error!("kernel-vm: {err}");
    panic!("{err}");
}
