//! The kernel's clock source and general-purpose timer engine.

use crate::clock::{AlarmTracker, ClockSource};
use crate::engine::PrecisionTimerEngine;
use crate::work_queue::WorkQueue;
use kernel_sync::SyncOnceCell;

static SYSTEM_CLOCK: SyncOnceCell<&'static dyn ClockSource> = SyncOnceCell::new();
static GENERAL_TIMER_ENGINE: SyncOnceCell<PrecisionTimerEngine> = SyncOnceCell::new();

/// Publishes the clock all kernel time is read from.
///
/// # Errors
/// Hands `clock` back if a clock was installed before.
pub fn install_system_clock_source(
    clock: &'static dyn ClockSource,
) -> Result<(), &'static dyn ClockSource> {
    SYSTEM_CLOCK.set(clock)
}

#[must_use]
pub fn system_clock_source() -> Option<&'static dyn ClockSource> {
    SYSTEM_CLOCK.get().copied()
}

/// Creates the general timer engine and binds it to `alarm`.
///
/// # Panics
/// If an engine was installed before.
pub fn install_general_timer_engine(
    clock: &'static dyn ClockSource,
    alarm: &'static dyn AlarmTracker,
    work: &'static dyn WorkQueue,
) -> &'static PrecisionTimerEngine {
    let mut created = false;
    let engine = GENERAL_TIMER_ENGINE.get_or_init(|| {
        created = true;
        PrecisionTimerEngine::new(clock, alarm, work)
    });
    assert!(created, "general timer engine installed twice");
    engine.bind_alarm();
    engine
}

#[must_use]
pub fn general_timer_engine() -> Option<&'static PrecisionTimerEngine> {
    GENERAL_TIMER_ENGINE.get()
}
