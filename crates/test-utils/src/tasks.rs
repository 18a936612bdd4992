//! Fake tasks for driving a `TaskGroup` from tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use taskgroup::{Task, TaskContext, TaskHandle};

/// Shared view of a [`ManualTask`]: every context it was given, plus hook
/// counters.
#[derive(Default)]
pub struct ManualControl {
    contexts: Mutex<Vec<TaskContext>>,
    executes: AtomicUsize,
    cancel_requests: AtomicUsize,
    stop_requests: AtomicUsize,
    pause_requests: AtomicUsize,
}

impl ManualControl {
    /// Oldest context not yet taken.
    pub fn take_context(&self) -> Option<TaskContext> {
        let mut contexts = self.contexts.lock().unwrap();
        if contexts.is_empty() {
            None
        } else {
            Some(contexts.remove(0))
        }
    }

    pub fn executes(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn cancel_requests(&self) -> usize {
        self.cancel_requests.load(Ordering::SeqCst)
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }

    pub fn pause_requests(&self) -> usize {
        self.pause_requests.load(Ordering::SeqCst)
    }
}

/// A task that does nothing on its own: the test completes each run by
/// taking the context from its [`ManualControl`].
pub struct ManualTask {
    name: String,
    control: Arc<ManualControl>,
}

impl ManualTask {
    pub fn new(name: &str) -> (Self, Arc<ManualControl>) {
        let control = Arc::new(ManualControl::default());
        let task = Self {
            name: name.to_string(),
            control: Arc::clone(&control),
        };
        (task, control)
    }

    /// Wrapped in a handle, ready to add to a group.
    pub fn handle(name: &str) -> (TaskHandle, Arc<ManualControl>) {
        let (task, control) = Self::new(name);
        (TaskHandle::new(task), control)
    }
}

impl Task for ManualTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: TaskContext) -> anyhow::Result<()> {
        self.control.executes.fetch_add(1, Ordering::SeqCst);
        self.control.contexts.lock().unwrap().push(ctx);
        Ok(())
    }

    fn on_cancel_requested(&self) {
        self.control.cancel_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stop_requested(&self) {
        self.control.stop_requests.fetch_add(1, Ordering::SeqCst);
    }

    fn on_pause_requested(&self) {
        self.control.pause_requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts tasks inside their run and remembers the highest count seen.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
    finished: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Sleeps for `delay` on a spawned tokio task, then succeeds. Honours
/// cancellation. Reports to a shared [`ConcurrencyProbe`].
pub struct ProbeTask {
    name: String,
    delay: Duration,
    weight: u32,
    probe: Arc<ConcurrencyProbe>,
}

impl ProbeTask {
    pub fn new(name: &str, delay: Duration, probe: Arc<ConcurrencyProbe>) -> Self {
        Self {
            name: name.to_string(),
            delay,
            weight: 1,
            probe,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

impl Task for ProbeTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> u32 {
        self.weight
    }

    fn execute(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let probe = Arc::clone(&self.probe);
        let delay = self.delay;
        probe.enter();
        tokio::spawn(async move {
            let cancel = ctx.cancelled_token();
            tokio::select! {
                _ = cancel.cancelled() => {
                    probe.exit();
                    ctx.cancelled();
                }
                _ = tokio::time::sleep(delay) => {
                    ctx.progress(100);
                    probe.exit();
                    ctx.succeed();
                }
            }
        });
        Ok(())
    }
}

/// `execute` fails (or panics) the first `failures` times, then succeeds
/// synchronously.
pub struct FlakyTask {
    failures: usize,
    panics: bool,
    attempts: Arc<AtomicUsize>,
}

impl FlakyTask {
    pub fn failing(failures: usize) -> (Self, Arc<AtomicUsize>) {
        Self::build(failures, false)
    }

    pub fn panicking(failures: usize) -> (Self, Arc<AtomicUsize>) {
        Self::build(failures, true)
    }

    fn build(failures: usize, panics: bool) -> (Self, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        let task = Self {
            failures,
            panics,
            attempts: Arc::clone(&attempts),
        };
        (task, attempts)
    }
}

impl Task for FlakyTask {
    fn name(&self) -> &str {
        "flaky"
    }

    fn execute(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            if self.panics {
                panic!("flaky task panicked on attempt {attempt}");
            }
            return Err(anyhow!("flaky task refused to start on attempt {attempt}"));
        }
        ctx.succeed();
        Ok(())
    }
}
