// src/group/pump.rs

//! Scheduling loop of an execution session.
//!
//! One pump task runs per executing group. Each pass it:
//! - applies every task signal queued on the channel
//! - ends the session if nothing remains outstanding
//! - claims ready tasks under the ceiling (under the group lock)
//! - calls `Task::execute` for each claimed task (outside the lock)
//!
//! and then waits for the next signal or wake-up. Tasks whose `execute`
//! failed are retried on the next scheduling event or, failing that, after
//! a backoff delay.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::group::task_group::GroupInner;
use crate::task::signal::SignalReceiver;
use crate::task::{TaskContext, TaskHandle};
use crate::types::{CancelKind, TaskId};

const RETRY_DELAY_MIN: Duration = Duration::from_millis(50);
const RETRY_DELAY_MAX: Duration = Duration::from_secs(2);

/// Tasks whose `execute` failed. They are skipped until the next
/// scheduling event or until the retry deadline passes, whichever comes
/// first. The deadline is fixed when the first task is held, so a stream of
/// unrelated signals cannot push it back.
struct HeldBack {
    ids: HashSet<TaskId>,
    retry_at: Option<Instant>,
    delay: Duration,
}

impl HeldBack {
    fn new() -> Self {
        Self {
            ids: HashSet::new(),
            retry_at: None,
            delay: RETRY_DELAY_MIN,
        }
    }

    fn hold(&mut self, id: TaskId) {
        self.ids.insert(id);
        if self.retry_at.is_none() {
            self.retry_at = Some(Instant::now() + self.delay);
        }
    }

    /// A scheduling event happened; everything may be tried again.
    fn release(&mut self) {
        self.ids.clear();
        self.retry_at = None;
    }

    /// Nothing else woke the pump in time. Back off further if the same
    /// tasks keep failing.
    fn release_after_timeout(&mut self) {
        self.release();
        self.delay = (self.delay * 2).min(RETRY_DELAY_MAX);
    }

    fn accepted(&mut self) {
        if self.ids.is_empty() {
            self.delay = RETRY_DELAY_MIN;
        }
    }
}

pub(crate) async fn run_pump(
    inner: Arc<GroupInner>,
    mut rx: SignalReceiver,
    session: CancellationToken,
) {
    debug!(group = %inner.id, "pump started");

    let mut held_back = HeldBack::new();

    loop {
        let (claimed, seen) = {
            let mut state = inner.lock_state();

            while let Ok(signal) = rx.try_recv() {
                let step = state.core.apply_signal(signal);
                if step.wake {
                    held_back.release();
                }
                inner.publish(step);
            }

            if let Some(step) = state.core.finish_if_done() {
                state.signal_rx = Some(rx);
                state.session = None;
                inner.publish(step);
                inner.idle.send_replace(true);
                debug!(group = %inner.id, "pump finished");
                return;
            }

            let mut skip = held_back.ids.clone();
            let mut claimed: Vec<(TaskHandle, TaskContext)> = Vec::new();
            while let Some(task) = state.core.select_next(&skip) {
                match task.begin_run(&session) {
                    Ok(ctx) => {
                        let step = state.core.task_started(&task);
                        inner.publish(step);
                        claimed.push((task, ctx));
                    }
                    Err(refusal) => {
                        debug!(group = %inner.id, task = %task, %refusal, "dispatch refused");
                        state.core.dispatch_refused(&task);
                        skip.insert(task.id());
                    }
                }
            }
            (claimed, inner.wake_seq.load(Ordering::Acquire))
        };

        let mut rolled_back = false;
        for (task, ctx) in claimed {
            if start(&inner, &task, ctx) {
                held_back.accepted();
            } else {
                held_back.hold(task.id());
                rolled_back = true;
            }
        }
        if rolled_back {
            // Give the freed slots to the next ready tasks right away.
            continue;
        }

        let retry_at = held_back.retry_at;
        tokio::select! {
            signal = rx.recv() => {
                if let Some(signal) = signal {
                    let mut state = inner.lock_state();
                    let step = state.core.apply_signal(signal);
                    if step.wake {
                        held_back.release();
                    }
                    inner.publish(step);
                }
            }
            _ = inner.wake.notified() => {
                if inner.wake_seq.load(Ordering::Acquire) != seen {
                    held_back.release();
                }
            }
            _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                debug!(
                    group = %inner.id,
                    tasks = held_back.ids.len(),
                    "retrying tasks whose execute failed"
                );
                held_back.release_after_timeout();
            }
        }
    }
}

/// Call `execute` for a claimed task and report `TaskStarted` once it
/// accepts the run. On error or panic the run is rolled back and `false`
/// is returned.
fn start(inner: &GroupInner, task: &TaskHandle, ctx: TaskContext) -> bool {
    let epoch = ctx.epoch();
    let work = Arc::clone(task.work());

    let error = match catch_unwind(AssertUnwindSafe(|| work.execute(ctx))) {
        Ok(Ok(())) => {
            let mut state = inner.lock_state();
            let step = state.core.execution_accepted(task);
            inner.publish(step);
            return true;
        }
        Ok(Err(err)) => format!("{err:#}"),
        Err(_) => "execute panicked".to_string(),
    };

    warn!(
        group = %inner.id,
        task = %task,
        %error,
        "task failed to start; returned to ready"
    );

    let halt = {
        let mut state = inner.lock_state();
        if !task.abort_run(epoch) {
            return false;
        }
        let step = state.core.dispatch_failed(task);
        inner.publish(step);
        // A halt that reached the task while `execute` was failing would be
        // lost with the rolled-back run.
        task.cancel_kind()
            .or_else(|| state.core.is_cancel_requested().then_some(CancelKind::Cancel))
    };

    match halt {
        Some(CancelKind::Cancel) => {
            task.cancel();
        }
        Some(CancelKind::Stop) => {
            task.stop();
        }
        None => {}
    }
    false
}
