//! # Memory Layout

/// End of userspace VA range after which Kernel space begins.
pub const LAST_USERSPACE_ADDRESS: u64 = 0xffff_0000_0000_0000;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything mapped at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Start of the window the kernel virtual memory arena carves heap ranges from.
pub const KERNEL_VM_BASE: u64 = 0xffff_e000_0000_0000;

/// Size of the kernel virtual memory arena. 2 GiB of kernel heap is sufficient for now.
pub const KERNEL_VM_SIZE: u64 = 0x8000_0000;

/// Start of the allocation trace ring buffer window.
pub const ALLOC_TRACE_BASE: u64 = 0xffff_f000_0000_0000;

/// Size of the allocation trace ring buffer (256 MiB).
pub const ALLOC_TRACE_SIZE: u64 = 256 * 1024 * 1024;

/// Where the kernel executes (VMA).
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

const _: () = {
    assert!(HHDM_BASE >= LAST_USERSPACE_ADDRESS);
    assert!(KERNEL_VM_BASE > HHDM_BASE);
    assert!(KERNEL_VM_BASE.is_multiple_of(KERNEL_VM_SIZE));
    assert!(KERNEL_VM_BASE + KERNEL_VM_SIZE <= ALLOC_TRACE_BASE);
    assert!(ALLOC_TRACE_BASE + ALLOC_TRACE_SIZE <= KERNEL_BASE);
    assert!(KERNEL_VM_SIZE.is_multiple_of(4096));
};
