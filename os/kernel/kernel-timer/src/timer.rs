//! Timer requests and the claim that decides who completes them.

use alloc::boxed::Box;
use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use kernel_sync::SpinMutex;

/// Life cycle of a [`PrecisionTimer`].
///
/// ```text
/// None ──install──► Queued ──expiry──► Retired
///   │                 │  └──expiry while cancelling──► Elapsed ──cancel──► Retired
///   │                 └──cancel──► Retired
///   └──install after cancel──► Retired
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerState {
    None = 0,
    Queued = 1,
    Elapsed = 2,
    Retired = 3,
}

impl TimerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::None,
            1 => Self::Queued,
            2 => Self::Elapsed,
            _ => Self::Retired,
        }
    }
}

/// What a timer's completion is told.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The deadline passed.
    Elapsed,
    /// The timer was cancelled before its deadline was processed.
    Cancelled,
}

const UNBOUND: u8 = 0;
const BOUND: u8 = 1;
const CANCEL_REQUESTED: u8 = 2;
const RESET: u8 = 3;

/// Result of requesting cancellation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CancelClaim {
    /// Not installed yet; installation will deliver the cancellation.
    BeforeInstall,
    /// The cancel path owns delivery and must retire the timer.
    Owned,
    /// Expiry already claimed delivery; nothing to do.
    TooLate,
}

/// Single-winner slot deciding whether expiry or cancellation delivers the
/// completion of a queued timer.
///
/// ```text
/// UNBOUND ──try_set──► BOUND ──try_reset──► RESET        (expiry wins)
///    │                   └──request──► CANCEL_REQUESTED  (cancel wins)
///    └──request──► CANCEL_REQUESTED ──try_set fails──    (cancelled early)
/// ```
pub(crate) struct CancelSlot(AtomicU8);

impl CancelSlot {
    const fn new() -> Self {
        Self(AtomicU8::new(UNBOUND))
    }

    /// Binds the slot at installation. Fails if cancellation came first.
    pub(crate) fn try_set(&self) -> bool {
        self.0
            .compare_exchange(UNBOUND, BOUND, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims delivery for expiry. Fails if a cancellation is in flight.
    pub(crate) fn try_reset(&self) -> bool {
        self.0
            .compare_exchange(BOUND, RESET, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claims cancellation.
    pub(crate) fn request(&self) -> CancelClaim {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let claim = match current {
                UNBOUND => CancelClaim::BeforeInstall,
                BOUND => CancelClaim::Owned,
                RESET => return CancelClaim::TooLate,
                _ => panic!("timer cancelled twice"),
            };
            match self.0.compare_exchange(
                current,
                CANCEL_REQUESTED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return claim,
                Err(actual) => current = actual,
            }
        }
    }
}

type Completion = Box<dyn FnOnce(TimerOutcome) + Send>;

/// A request to be woken at an absolute deadline.
///
/// Owned by its issuer through an `Arc`; the engine only keeps a weak
/// reference while the timer is queued.
pub struct PrecisionTimer {
    deadline: u64,
    state: AtomicU8,
    pub(crate) cancel: CancelSlot,
    was_cancelled: AtomicBool,
    /// Install order, used as the tie-break between equal deadlines.
    pub(crate) sequence: AtomicU64,
    completion: SpinMutex<Option<Completion>>,
}

impl PrecisionTimer {
    /// A timer due at `deadline` nanoseconds that reports to `completion`
    /// exactly once.
    pub fn new(deadline: u64, completion: impl FnOnce(TimerOutcome) + Send + 'static) -> Self {
        Self {
            deadline,
            state: AtomicU8::new(TimerState::None as u8),
            cancel: CancelSlot::new(),
            was_cancelled: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            completion: SpinMutex::new(Some(Box::new(completion))),
        }
    }

    #[must_use]
    pub const fn deadline(&self) -> u64 {
        self.deadline
    }

    #[must_use]
    pub fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the timer was retired by cancellation rather than expiry.
    #[must_use]
    pub fn was_cancelled(&self) -> bool {
        self.was_cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn set_state(&self, state: TimerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn mark_cancelled(&self) {
        self.was_cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn outcome(&self) -> TimerOutcome {
        if self.was_cancelled() {
            TimerOutcome::Cancelled
        } else {
            TimerOutcome::Elapsed
        }
    }

    /// Runs the completion. Later calls do nothing.
    pub(crate) fn complete(&self, outcome: TimerOutcome) {
        let completion = self.completion.lock_irq().take();
        if let Some(completion) = completion {
            completion(outcome);
        }
    }
}

impl fmt::Debug for PrecisionTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrecisionTimer")
            .field("deadline", &self.deadline)
            .field("state", &self.state())
            .field("was_cancelled", &self.was_cancelled())
            .finish_non_exhaustive()
    }
}
