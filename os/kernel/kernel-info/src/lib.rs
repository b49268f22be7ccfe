//! # Kernel Memory Layout Configuration
//!
//! Compile-time constants describing where the kernel's memory core places
//! its private windows in the higher half, shared by every crate that needs
//! to agree on them.
//!
//! ```text
//! HHDM_BASE             ┌─────────────────────────────────┐ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (physical memory window)      │
//! KERNEL_VM_BASE        ├─────────────────────────────────┤ 0xffff_e000_0000_0000
//!                       │   Kernel virtual memory arena   │
//!                       │   (2 GiB, buddy metadata tail)  │
//! ALLOC_TRACE_BASE      ├─────────────────────────────────┤ 0xffff_f000_0000_0000
//!                       │   Allocation trace ring buffer  │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │       Kernel Text & Data        │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! Every constant is checked by `const` assertions so an inconsistent layout
//! fails the build instead of corrupting memory at runtime.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
