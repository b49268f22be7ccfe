//! Time and alarm collaborators of the timer engine.

/// Monotonic nanosecond clock.
pub trait ClockSource: Sync {
    fn current_nanos(&self) -> u64;
}

/// Receiver of alarm interrupts.
pub trait AlarmSink: Sync {
    /// The armed deadline was reached (or the alarm fired spuriously).
    fn fired_alarm(&self);
}

/// A single one-shot alarm, e.g. the local APIC timer in TSC-deadline mode.
pub trait AlarmTracker: Sync {
    /// Routes alarm interrupts to `sink`.
    fn set_sink(&self, sink: &'static dyn AlarmSink);

    /// Fires the sink at or after `deadline` nanoseconds; `0` disarms.
    ///
    /// Re-arming replaces the previous deadline. Implementations must not
    /// call the sink from inside `arm`: the engine holds its lock while
    /// arming.
    fn arm(&self, deadline: u64);
}
