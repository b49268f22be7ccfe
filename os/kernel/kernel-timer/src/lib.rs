//! # Kernel Timers
//!
//! Absolute-deadline wakeups for any number of kernel actors, multiplexed
//! onto a single one-shot alarm.
//!
//! ```text
//!  install_timer / cancel_timer          fired_alarm (IRQ)
//!            │                                 │
//!            ▼                                 ▼
//!  ┌───────────────────────────────────────────────────┐
//!  │ PrecisionTimerEngine                              │
//!  │   deadline-ordered queue, IRQ-safe lock           │──► AlarmTracker::arm
//!  │   progress: retire due timers, re-arm, re-check   │──► ClockSource
//!  └─────────────────────────┬─────────────────────────┘
//!                            │ post(completion)
//!                            ▼
//!                       WorkQueue
//! ```
//!
//! A [`PrecisionTimer`] is owned by whoever issued it. Its completion runs
//! exactly once, from the work queue, with [`TimerOutcome::Elapsed`] or
//! [`TimerOutcome::Cancelled`], even when cancellation races with expiry.
//!
//! ```rust
//! use kernel_timer::{
//!     AlarmSink, AlarmTracker, ClockSource, LocalWorkQueue, PrecisionTimer,
//!     PrecisionTimerEngine, TimerOutcome,
//! };
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! struct Clock(AtomicU64);
//! impl ClockSource for Clock {
//!     fn current_nanos(&self) -> u64 { self.0.load(Ordering::SeqCst) }
//! }
//! struct NoAlarm;
//! impl AlarmTracker for NoAlarm {
//!     fn set_sink(&self, _: &'static dyn AlarmSink) {}
//!     fn arm(&self, _: u64) {}
//! }
//!
//! static CLOCK: Clock = Clock(AtomicU64::new(0));
//! static WORK: LocalWorkQueue = LocalWorkQueue::new();
//! let engine: &'static PrecisionTimerEngine =
//!     Box::leak(Box::new(PrecisionTimerEngine::new(&CLOCK, &NoAlarm, &WORK)));
//! engine.bind_alarm();
//!
//! let timer = Arc::new(PrecisionTimer::new(1_000, |outcome| {
//!     assert_eq!(outcome, TimerOutcome::Elapsed);
//! }));
//! engine.install_timer(&timer);
//!
//! CLOCK.0.store(1_000, Ordering::SeqCst);
//! engine.fired_alarm();
//! assert_eq!(WORK.run_pending(), 1);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod clock;
mod engine;
mod global;
mod timer;
mod work_queue;

pub use clock::{AlarmSink, AlarmTracker, ClockSource};
pub use engine::PrecisionTimerEngine;
pub use global::{
    general_timer_engine, install_general_timer_engine, install_system_clock_source,
    system_clock_source,
};
pub use timer::{PrecisionTimer, TimerOutcome, TimerState};
pub use work_queue::{LocalWorkQueue, WorkQueue, Worklet};
