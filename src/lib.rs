// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod group;
pub mod logging;
pub mod queue;
pub mod sim;
pub mod task;
pub mod types;

pub use errors::{Result as TaskGroupResult, TaskGroupError};
pub use group::{GroupEvent, GroupStatus, IdleHandle, TaskGroup};
pub use queue::{CommandQueue, EventPump, EventWrapper};
pub use task::{Completion, Task, TaskContext, TaskHandle, TaskOutcome};
pub use types::{CancelKind, GroupId, TaskId, TaskState};

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::sim::SimulatedTask;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - a task group fed with simulated tasks
/// - an event printer draining the group's event queue in order
/// - Ctrl-C handling (cancels the group and waits for it to drain)
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let group = TaskGroup::from_config(&cfg.group)?;
    let mut events = group
        .take_event_pump()
        .context("event pump of a new group was already taken")?;
    let idle = group.idle_handle();

    let tasks: Vec<TaskHandle> = (1..=cfg.simulation.tasks)
        .map(|i| TaskHandle::new(SimulatedTask::from_section(i, &cfg.simulation)))
        .collect();
    info!(
        group = %group.id(),
        tasks = tasks.len(),
        max_running = cfg.group.max_running_tasks,
        "starting simulation"
    );
    group.add_range(tasks)?;

    // Ctrl-C → cancel the group; the loop below keeps draining until idle.
    {
        let group = group.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            match group.cancel() {
                Ok(true) => info!("Ctrl+C received; cancelling tasks"),
                Ok(false) => debug!("Ctrl+C received while nothing was running"),
                Err(err) => warn!(%err, "failed to cancel task group"),
            }
        });
    }

    loop {
        tokio::select! {
            Some(wrapper) = events.recv() => print_event(&wrapper),
            _ = idle.wait() => break,
        }
    }
    while let Some(wrapper) = events.try_recv() {
        print_event(&wrapper);
    }

    print_summary(&group);
    group.dispose()?;
    Ok(())
}

/// Defaults, then the config file (if any), then CLI flags.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let base = match &args.config {
        Some(path) => {
            let cfg = load_and_validate(path)
                .with_context(|| format!("failed to load config from {path}"))?;
            RawConfigFile {
                group: cfg.group,
                simulation: cfg.simulation,
            }
        }
        None => RawConfigFile::default(),
    };

    let mut raw = base;
    if let Some(n) = args.max_running {
        raw.group.max_running_tasks = n;
    }
    if let Some(n) = args.tasks {
        raw.simulation.tasks = n;
    }
    if let Some(n) = args.steps {
        raw.simulation.steps = n;
    }
    if let Some(ms) = args.step_ms {
        raw.simulation.step_ms = ms;
    }
    if let Some(n) = args.fail_every {
        raw.simulation.fail_every = n;
    }

    Ok(ConfigFile::try_from(raw)?)
}

fn print_event(wrapper: &EventWrapper<GroupEvent>) {
    let seq = wrapper.seq;
    match &wrapper.event {
        GroupEvent::TaskAdded { tasks } => {
            for (index, task) in tasks {
                println!("[{seq:>4}] added      {task} at {index}");
            }
        }
        GroupEvent::TaskRemoved { index, task } => {
            println!("[{seq:>4}] removed    {task} from {index}");
        }
        GroupEvent::TaskStarted { task } => println!("[{seq:>4}] started    {task}"),
        GroupEvent::TaskCompleted { task, completion } => match &completion.error {
            Some(err) => println!("[{seq:>4}] completed  {task}: {} ({err})", completion.state),
            None => println!("[{seq:>4}] completed  {task}: {}", completion.state),
        },
        GroupEvent::TaskProgressChanged {
            task,
            percent,
            user_state,
        } => match user_state {
            Some(state) => println!("[{seq:>4}] progress   {task}: {percent:>3}% {state}"),
            None => println!("[{seq:>4}] progress   {task}: {percent:>3}%"),
        },
        GroupEvent::ProgressChanged { percent } => {
            println!("[{seq:>4}] group      {percent:>3}%");
        }
        GroupEvent::StatusChanged { status } => println!(
            "[{seq:>4}] status     running={} pending={} remaining={} completed={} ({})",
            status.running, status.pending, status.remaining, status.completed, status.activity
        ),
        GroupEvent::Started => println!("[{seq:>4}] session started"),
        GroupEvent::Stopped => println!("[{seq:>4}] session stopped"),
        other => debug!(seq, kind = other.kind(), "event"),
    }
}

fn print_summary(group: &TaskGroup) {
    let mut by_state: BTreeMap<String, usize> = BTreeMap::new();
    for task in group.tasks() {
        *by_state.entry(task.state().to_string()).or_default() += 1;
    }

    println!();
    println!("summary ({} tasks):", group.count());
    for (state, n) in &by_state {
        println!("  {state:<10} {n}");
    }
    println!("  completed  {} (counted)", group.completed_tasks());
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("taskgroup dry-run");
    println!("  group.max_running_tasks = {}", cfg.group.max_running_tasks);
    println!("  simulation.tasks = {}", cfg.simulation.tasks);
    println!("  simulation.steps = {}", cfg.simulation.steps);
    println!("  simulation.step_ms = {}", cfg.simulation.step_ms);
    println!("  simulation.fail_every = {}", cfg.simulation.fail_every);

    debug!("dry-run complete (no execution)");
}
