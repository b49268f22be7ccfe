//! # Kernel Virtual Memory
//!
//! This crate provides the kernel's private address-space allocator: the
//! layer between the physical frame allocator and the kernel heap. It hands
//! out page-backed ranges of kernel virtual memory and reclaims them safely
//! while other CPUs may still cache translations for them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          Kernel heap (slab pools, external)         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ map / unmap / poison / output_trace
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Kernel Virtual Allocator                 │
//! │    • Eager backing with 4 KiB frames                │
//! │    • Deferred release after TLB shootdown           │
//! └────────┬─────────────────────────┬──────────────────┘
//!          │ allocate / deallocate   │ frames, mappings, shootdowns
//! ┌────────▼──────────────────┐  ┌───▼──────────────────────────┐
//! │ Kernel Virtual Memory     │  │ PhysicalFrameAlloc,          │
//! │ Arena                     │  │ KernelPageSpace, PhysMapper, │
//! │  • buddy over a fixed     │  │ ShadowMemory (external)      │
//! │    window, IRQ-safe lock  │  └──────────────────────────────┘
//! └───────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Block Allocator ([`buddy`])
//!
//! A flat tree-of-maxima buddy allocator. It keeps one byte per tree node in
//! caller-provided storage and does no locking of its own.
//!
//! ### Arena ([`kernel_vm`])
//!
//! [`KernelVirtualMemory`] owns a fixed window (2 GiB at
//! `KERNEL_VM_BASE` by default). Its buddy tables sit in the tail of the
//! window, backed when the arena is built. Allocation rounds up to a
//! power-of-two number of pages; requests larger than one root block, and
//! exhaustion, halt the kernel after logging current usage.
//!
//! ### Virtual Allocator ([`virtual_alloc`])
//!
//! [`KernelVirtualAlloc`] backs every page of a reserved range with its own
//! frame. Unmapping frees the frames immediately but returns the range to the
//! arena from a completion closure that runs once the shootdown finishes.
//! The closure lives in a physical page of its own, reached through the
//! [`phys_mapper`] window, so reclaiming heap memory never allocates heap
//! memory.
//!
//! ### Allocation Trace ([`trace_ring`])
//!
//! With the `trace-allocations` feature, the heap can record allocation
//! events into a [`LogRingBuffer`] over a dedicated window.
//!
//! ## Failure Model
//!
//! Kernel-internal allocation has no fallback, so nothing here returns an
//! error to its caller. Exhaustion and contract violations go through
//! [`error::fatal`], which logs and panics; the kernel's panic handler halts.
//! Only [`KernelVmConfig`] validation is recoverable.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_alloc::{MemoryBackends, kernel_virtual_alloc, register_backends};
//! # fn backends() -> MemoryBackends { unimplemented!() }
//!
//! register_backends(backends()).ok();
//! let heap = kernel_virtual_alloc();
//! let va = heap.map(0x4000);
//! heap.unmap(va, 0x4000);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod buddy;
pub mod config;
pub mod error;
mod global;
pub mod kernel_vm;
pub mod page_space;
pub mod phys_mapper;
pub mod shadow;
pub mod trace_ring;
mod usage;
pub mod virtual_alloc;

pub use config::KernelVmConfig;
pub use error::{KernelVmConfigError, KernelVmError};
pub use global::{alloc_trace_ring, kernel_virtual_alloc, kernel_virtual_memory, register_backends};
pub use kernel_vm::{KernelVirtualMemory, MemoryBackends};
pub use page_space::{CachingMode, KernelPageSpace, PageAccess, PhysicalFrameAlloc, ShootNode};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
pub use shadow::{NoShadow, ShadowMemory};
pub use trace_ring::{DequeueResult, LogRingBuffer};
pub use usage::MemoryUsage;
pub use virtual_alloc::KernelVirtualAlloc;
