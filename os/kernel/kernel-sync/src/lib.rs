//! # Kernel synchronization primitives
//!
//! The locking glue shared by the kernel's memory and timer cores:
//!
//! - [`SpinMutex`], a test-and-test-and-set spin lock,
//! - [`SpinMutex::lock_irq`] / [`IrqSpinGuard`], which disable local interrupts
//!   *before* taking the lock so a handler on the same CPU cannot re-enter it,
//! - [`SyncOnceCell`] for construct-on-first-use kernel services.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin;
mod sync_once_cell;

pub use irq::{IrqGuard, IrqSpinGuard};
pub use spin::{SpinGuard, SpinMutex};
pub use sync_once_cell::SyncOnceCell;
