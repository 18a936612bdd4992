mod common;
use crate::common::{TestResult, eventually, init_tracing, recorded_group, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use taskgroup::config::SimulationSection;
use taskgroup::sim::SimulatedTask;
use taskgroup::{GroupEvent, TaskHandle, TaskState};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simulated_workload_runs_to_completion() -> TestResult {
    init_tracing();

    let section = SimulationSection {
        tasks: 4,
        steps: 3,
        step_ms: 2,
        fail_every: 2,
    };
    let (group, recorder, _pump) = recorded_group(2);
    let handles: Vec<TaskHandle> = (1..=section.tasks)
        .map(|i| TaskHandle::new(SimulatedTask::from_section(i, &section)))
        .collect();
    group.add_range(handles.clone())?;

    with_timeout(group.idle_handle().wait()).await;

    let states: Vec<TaskState> = handles.iter().map(TaskHandle::state).collect();
    assert_eq!(
        states,
        vec![
            TaskState::Succeeded,
            TaskState::Failed,
            TaskState::Succeeded,
            TaskState::Failed
        ]
    );
    assert_eq!(group.completed_tasks(), 4);
    assert_eq!(group.remaining_tasks(), 0);

    eventually(|| recorder.count(|e| matches!(e, GroupEvent::Stopped)) == 1).await;
    let step_reports = recorder.count(|e| matches!(
        e,
        GroupEvent::TaskProgressChanged { user_state: Some(_), .. }
    ));
    assert_eq!(step_reports, 4 * 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_simulation_resumes_where_it_left_off() -> TestResult {
    init_tracing();

    let (group, _recorder, _pump) = recorded_group(1);
    let sim = Arc::new(SimulatedTask::new("long", 50, Duration::from_millis(5), false));
    let task = TaskHandle::from_arc(sim.clone());
    group.add(task.clone())?;

    eventually(|| sim.steps_done() >= 2).await;
    assert!(task.request_pause());
    eventually(|| task.state() == TaskState::Paused).await;

    let paused_at = sim.steps_done();
    assert!(paused_at < 50);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sim.steps_done(), paused_at, "no progress while paused");

    assert!(group.resume(&task)?);
    with_timeout(group.idle_handle().wait()).await;

    assert_eq!(task.state(), TaskState::Succeeded);
    assert_eq!(sim.steps_done(), 50);
    assert_eq!(task.progress(), 100);
    Ok(())
}
