//! Deferred execution of completions.
//!
//! Timer completions never run on the stack that resolved them; they are
//! posted as [`Worklet`]s and run later, outside every engine lock.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use kernel_sync::SpinMutex;

/// A one-shot unit of deferred work.
pub struct Worklet(Box<dyn FnOnce() + Send>);

impl Worklet {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn run(self) {
        (self.0)();
    }
}

pub trait WorkQueue: Sync {
    /// Schedules `worklet` to run later, possibly on another CPU.
    fn post(&self, worklet: Worklet);
}

/// A FIFO of worklets drained by whoever calls [`run_pending`](Self::run_pending),
/// typically the idle loop of one CPU.
pub struct LocalWorkQueue {
    queue: SpinMutex<VecDeque<Worklet>>,
}

impl Default for LocalWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalWorkQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: SpinMutex::new(VecDeque::new()),
        }
    }

    /// Runs worklets until the queue is empty, including ones posted while
    /// draining. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            // The guard is dropped before the worklet runs.
            let Some(worklet) = self.queue.lock_irq().pop_front() else {
                return ran;
            };
            worklet.run();
            ran += 1;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock_irq().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WorkQueue for LocalWorkQueue {
    fn post(&self, worklet: Worklet) {
        self.queue.lock_irq().push_back(worklet);
    }
}
