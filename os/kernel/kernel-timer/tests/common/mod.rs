//! Manual clock, recording alarm and outcome recorder for engine tests.

#![allow(dead_code)]

use kernel_timer::{
    AlarmSink, AlarmTracker, ClockSource, LocalWorkQueue, PrecisionTimer, PrecisionTimerEngine,
    TimerOutcome,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A clock that only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: u64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl ClockSource for ManualClock {
    fn current_nanos(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Records every `arm` call. Optionally lets `latency` nanoseconds pass on
/// the clock while arming.
pub struct RecordingAlarm {
    clock: &'static ManualClock,
    latency: AtomicU64,
    sink: Mutex<Option<&'static dyn AlarmSink>>,
    arms: Mutex<Vec<u64>>,
}

impl RecordingAlarm {
    pub fn new(clock: &'static ManualClock) -> Self {
        Self {
            clock,
            latency: AtomicU64::new(0),
            sink: Mutex::new(None),
            arms: Mutex::new(Vec::new()),
        }
    }

    pub fn set_latency(&self, latency: u64) {
        self.latency.store(latency, Ordering::SeqCst);
    }

    pub fn arms(&self) -> Vec<u64> {
        self.arms.lock().unwrap().clone()
    }

    /// The deadline currently armed, `0` if disarmed.
    pub fn armed(&self) -> u64 {
        self.arms.lock().unwrap().last().copied().unwrap_or(0)
    }

    /// Delivers the alarm interrupt to the registered sink.
    pub fn fire(&self) {
        let sink = self.sink.lock().unwrap().expect("no sink registered");
        sink.fired_alarm();
    }
}

impl AlarmTracker for RecordingAlarm {
    fn set_sink(&self, sink: &'static dyn AlarmSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn arm(&self, deadline: u64) {
        self.arms.lock().unwrap().push(deadline);
        self.clock.advance(self.latency.load(Ordering::SeqCst));
    }
}

pub struct Harness {
    pub clock: &'static ManualClock,
    pub alarm: &'static RecordingAlarm,
    pub work: &'static LocalWorkQueue,
    pub engine: &'static PrecisionTimerEngine,
    outcomes: Arc<Mutex<Vec<(usize, TimerOutcome)>>>,
}

impl Harness {
    pub fn new() -> Self {
        let clock: &'static ManualClock = Box::leak(Box::default());
        let alarm: &'static RecordingAlarm = Box::leak(Box::new(RecordingAlarm::new(clock)));
        let work: &'static LocalWorkQueue = Box::leak(Box::new(LocalWorkQueue::new()));
        let engine: &'static PrecisionTimerEngine =
            Box::leak(Box::new(PrecisionTimerEngine::new(clock, alarm, work)));
        engine.bind_alarm();

        Self {
            clock,
            alarm,
            work,
            engine,
            outcomes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A timer that reports `(id, outcome)` to this harness.
    pub fn timer(&self, id: usize, deadline: u64) -> Arc<PrecisionTimer> {
        let outcomes = Arc::clone(&self.outcomes);
        Arc::new(PrecisionTimer::new(deadline, move |outcome| {
            outcomes.lock().unwrap().push((id, outcome));
        }))
    }

    /// Runs posted completions and returns everything reported so far.
    pub fn outcomes(&self) -> Vec<(usize, TimerOutcome)> {
        self.work.run_pending();
        self.outcomes.lock().unwrap().clone()
    }
}
