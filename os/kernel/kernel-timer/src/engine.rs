//! # Precision timer engine
//!
//! Keeps every installed [`PrecisionTimer`] in deadline order and drives one
//! [`AlarmTracker`] so that exactly one alarm is outstanding: the one for the
//! earliest pending deadline.
//!
//! Two races are resolved here:
//!
//! - **Arming vs. the clock.** Programming the alarm takes time; the deadline
//!   may pass before the alarm is armed, and the interrupt would then never
//!   come. After arming, the progress step re-reads the clock and processes
//!   again until the armed deadline is still in the future.
//! - **Expiry vs. cancellation.** Both paths claim delivery through the
//!   timer's cancel slot; exactly one wins and posts the completion.
//!
//! Every entry point disables interrupts and takes the engine lock.
//! Completions run later from the [`WorkQueue`], never under the lock.

use crate::clock::{AlarmSink, AlarmTracker, ClockSource};
use crate::timer::{CancelClaim, PrecisionTimer, TimerState};
use crate::work_queue::{WorkQueue, Worklet};
use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use core::sync::atomic::Ordering;
use kernel_sync::SpinMutex;
use log::{trace, warn};

struct TimerQueue {
    /// Pending timers by `(deadline, install sequence)`.
    pending: BTreeMap<(u64, u64), Weak<PrecisionTimer>>,
    active: usize,
    next_sequence: u64,
}

pub struct PrecisionTimerEngine {
    clock: &'static dyn ClockSource,
    alarm: &'static dyn AlarmTracker,
    work: &'static dyn WorkQueue,
    queue: SpinMutex<TimerQueue>,
}

impl PrecisionTimerEngine {
    /// Creates an engine. It receives alarms once [`bind_alarm`](Self::bind_alarm)
    /// has been called.
    #[must_use]
    pub const fn new(
        clock: &'static dyn ClockSource,
        alarm: &'static dyn AlarmTracker,
        work: &'static dyn WorkQueue,
    ) -> Self {
        Self {
            clock,
            alarm,
            work,
            queue: SpinMutex::new(TimerQueue {
                pending: BTreeMap::new(),
                active: 0,
                next_sequence: 0,
            }),
        }
    }

    /// Registers the engine as the alarm's sink.
    pub fn bind_alarm(&'static self) {
        self.alarm.set_sink(self);
    }

    #[must_use]
    pub const fn clock(&self) -> &'static dyn ClockSource {
        self.clock
    }

    /// Queues `timer` for its deadline.
    ///
    /// A timer that was cancelled before installation is retired right away
    /// and its completion posted; a timer whose deadline already passed
    /// completes from within this call.
    ///
    /// # Panics
    /// If `timer` was installed before.
    pub fn install_timer(&self, timer: &Arc<PrecisionTimer>) {
        let mut queue = self.queue.lock_irq();
        assert_eq!(timer.state(), TimerState::None, "timer installed twice");

        trace!(
            "timer: setting timer at {} (counter is {})",
            timer.deadline(),
            self.clock.current_nanos()
        );

        if !timer.cancel.try_set() {
            timer.mark_cancelled();
            timer.set_state(TimerState::Retired);
            self.deliver(timer);
            return;
        }

        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        timer.sequence.store(sequence, Ordering::Relaxed);

        queue
            .pending
            .insert((timer.deadline(), sequence), Arc::downgrade(timer));
        queue.active += 1;
        timer.set_state(TimerState::Queued);

        self.progress(&mut queue);
    }

    /// Cancels `timer`.
    ///
    /// Safe to call concurrently with the timer's expiry: exactly one of the
    /// two delivers the completion. Cancelling a timer that already expired is
    /// a no-op; cancelling one that is not installed yet makes the later
    /// installation complete it as cancelled.
    ///
    /// # Panics
    /// If `timer` was cancelled before.
    pub fn cancel_timer(&self, timer: &Arc<PrecisionTimer>) {
        match timer.cancel.request() {
            CancelClaim::Owned => self.retire_cancelled(timer),
            CancelClaim::BeforeInstall | CancelClaim::TooLate => {}
        }
    }

    /// Number of queued timers.
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.queue.lock_irq().active
    }

    /// Earliest queued deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue
            .lock_irq()
            .pending
            .keys()
            .next()
            .map(|&(deadline, _)| deadline)
    }

    /// Locked half of a cancellation the caller has claimed.
    fn retire_cancelled(&self, timer: &Arc<PrecisionTimer>) {
        let mut queue = self.queue.lock_irq();

        match timer.state() {
            TimerState::Queued => {
                let key = (timer.deadline(), timer.sequence.load(Ordering::Relaxed));
                queue.pending.remove(&key);
                queue.active -= 1;
                timer.mark_cancelled();
            }
            // Expiry saw the claim and left delivery to us.
            TimerState::Elapsed => {}
            state => panic!("cancelling a timer in state {state:?}"),
        }

        timer.set_state(TimerState::Retired);
        self.deliver(timer);
    }

    fn deliver(&self, timer: &Arc<PrecisionTimer>) {
        let outcome = timer.outcome();
        let timer = Arc::clone(timer);
        self.work.post(Worklet::new(move || timer.complete(outcome)));
    }

    /// Retires everything that is due, then arms the alarm for what is left.
    fn progress(&self, queue: &mut TimerQueue) {
        let mut current = self.clock.current_nanos();
        loop {
            trace!("timer: processing timers until {current}");

            let next = loop {
                let Some(entry) = queue.pending.first_entry() else {
                    self.alarm.arm(0);
                    return;
                };
                let deadline = entry.key().0;
                if deadline > current {
                    break deadline;
                }

                let timer = entry.remove();
                queue.active -= 1;
                let Some(timer) = timer.upgrade() else {
                    warn!("timer: timer due at {deadline} was dropped while queued");
                    continue;
                };
                assert_eq!(timer.state(), TimerState::Queued);

                if timer.cancel.try_reset() {
                    timer.set_state(TimerState::Retired);
                    self.deliver(&timer);
                } else {
                    // The cancel path delivers.
                    timer.set_state(TimerState::Elapsed);
                }
            };

            self.alarm.arm(next);
            current = self.clock.current_nanos();
            if next > current {
                return;
            }
        }
    }
}

impl AlarmSink for PrecisionTimerEngine {
    fn fired_alarm(&self) {
        let mut queue = self.queue.lock_irq();
        self.progress(&mut queue);
    }
}
