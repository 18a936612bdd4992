// src/sim.rs

//! Simulated workload used by the binary: each task sleeps through a fixed
//! number of steps, reporting progress after each one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::runtime::Handle;
use tracing::trace;

use crate::config::model::SimulationSection;
use crate::task::{Task, TaskContext};

#[derive(Debug)]
pub struct SimulatedTask {
    name: String,
    steps: u32,
    step: Duration,
    fail: bool,
    /// Steps finished so far; a resumed run continues from here.
    done: Arc<AtomicU32>,
}

impl SimulatedTask {
    pub fn new(name: impl Into<String>, steps: u32, step: Duration, fail: bool) -> Self {
        Self {
            name: name.into(),
            steps,
            step,
            fail,
            done: Arc::new(AtomicU32::new(0)),
        }
    }

    /// The `index`-th task (1-based) of a simulation.
    pub fn from_section(index: usize, section: &SimulationSection) -> Self {
        let fail = section.fail_every > 0 && index % section.fail_every == 0;
        Self::new(
            format!("sim-{index}"),
            section.steps,
            Duration::from_millis(section.step_ms),
            fail,
        )
    }

    pub fn will_fail(&self) -> bool {
        self.fail
    }

    pub fn steps_done(&self) -> u32 {
        self.done.load(Ordering::Acquire)
    }
}

impl Task for SimulatedTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: TaskContext) -> anyhow::Result<()> {
        let runtime = Handle::try_current().context("simulated tasks need a tokio runtime")?;
        runtime.spawn(simulate(
            ctx,
            self.steps,
            self.step,
            self.fail,
            Arc::clone(&self.done),
        ));
        Ok(())
    }
}

async fn simulate(ctx: TaskContext, steps: u32, delay: Duration, fail: bool, done: Arc<AtomicU32>) {
    let cancel = ctx.cancelled_token();
    let pause = ctx.pause_token();
    let mut step = done.load(Ordering::Acquire);

    while step < steps {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!(task = %ctx.task_id(), step, "simulation cancelled");
                ctx.cancelled();
                return;
            }
            _ = pause.cancelled() => {
                trace!(task = %ctx.task_id(), step, "simulation paused");
                ctx.pause();
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        step += 1;
        done.store(step, Ordering::Release);
        let percent = (u64::from(step) * 100 / u64::from(steps)) as i32;
        ctx.progress_with_state(percent, format!("step {step}/{steps}"));
    }

    if fail {
        ctx.fail(anyhow!("simulated failure after {steps} steps"));
    } else {
        ctx.succeed();
    }
}
