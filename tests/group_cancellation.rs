mod common;
use crate::common::{ManualTask, TestResult, eventually, init_tracing, recorded_group, with_timeout};

use taskgroup::{CancelKind, GroupEvent, TaskGroup, TaskGroupError, TaskState};

/// Single-threaded runtime: the pump spawned by `add_range` cannot run
/// before the test yields, so nothing has started when `cancel` is called.
#[tokio::test]
async fn cancel_before_any_start_cancels_every_task() -> TestResult {
    init_tracing();

    let (group, recorder, _pump) = recorded_group(2);
    let (handles, controls): (Vec<_>, Vec<_>) =
        (0..3).map(|i| ManualTask::handle(&format!("t{i}"))).unzip();
    group.add_range(handles.clone())?;

    assert!(group.cancel()?);
    assert!(!group.cancel()?, "second cancel is a no-op");
    assert!(!group.stop()?);
    assert!(group.is_cancel_requested());

    let (late, _late_ctl) = ManualTask::handle("late");
    assert!(matches!(
        group.add(late.clone()),
        Err(TaskGroupError::CancellationRequested)
    ));
    assert!(matches!(
        group.insert(0, late.clone()),
        Err(TaskGroupError::CancellationRequested)
    ));
    assert_eq!(late.group_id(), None);

    with_timeout(group.idle_handle().wait()).await;

    assert!(controls.iter().all(|c| c.executes() == 0));
    assert!(handles.iter().all(|t| t.state() == TaskState::Cancelled));
    assert_eq!(group.completed_tasks(), 0);
    assert_eq!(group.remaining_tasks(), 0);
    assert!(!group.is_cancel_requested());

    eventually(|| recorder.completions().len() == 3).await;
    assert!(
        recorder
            .completions()
            .iter()
            .all(|(_, state)| *state == TaskState::Cancelled)
    );
    assert_eq!(
        recorder.count(|e| matches!(e, GroupEvent::TaskCompleted { completion, .. } if completion.cancelled)),
        3
    );

    // Once drained, the group accepts work again.
    group.add(late)?;
    assert!(group.is_busy());
    Ok(())
}

#[tokio::test]
async fn cancel_on_an_idle_group_does_nothing() -> TestResult {
    let group = TaskGroup::new(1)?;
    assert!(!group.cancel()?);
    assert!(!group.is_cancel_requested());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_tasks_decide_how_to_honour_cancellation() -> TestResult {
    init_tracing();

    let group = TaskGroup::new(2)?;
    let (a, a_ctl) = ManualTask::handle("a");
    let (b, b_ctl) = ManualTask::handle("b");
    let (c, c_ctl) = ManualTask::handle("c");
    group.add_range([a.clone(), b.clone(), c.clone()])?;

    eventually(|| a_ctl.executes() == 1 && b_ctl.executes() == 1).await;
    let a_ctx = a_ctl.take_context().expect("executed");
    let b_ctx = b_ctl.take_context().expect("executed");

    assert!(group.cancel()?);
    assert!(a_ctx.is_cancelled());
    assert!(b_ctx.is_cancelled());
    assert_eq!(a_ctx.cancel_kind(), Some(CancelKind::Cancel));
    assert_eq!(a_ctl.cancel_requests(), 1);
    assert_eq!(b_ctl.cancel_requests(), 1);

    // The idle task is cancelled outright, the running ones keep going.
    eventually(|| c.state() == TaskState::Cancelled).await;
    assert_eq!(c_ctl.executes(), 0);
    assert!(group.is_busy());
    assert_eq!(a.state(), TaskState::Running);

    a_ctx.cancelled();
    b_ctx.succeed();

    with_timeout(group.idle_handle().wait()).await;
    assert_eq!(a.state(), TaskState::Cancelled);
    assert_eq!(b.state(), TaskState::Succeeded);
    assert_eq!(group.completed_tasks(), 1, "only the finished run counts");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_reaches_the_stop_hook() -> TestResult {
    init_tracing();

    let group = TaskGroup::new(1)?;
    let (task, ctl) = ManualTask::handle("stoppable");
    group.add(task.clone())?;

    eventually(|| ctl.executes() == 1).await;
    let ctx = ctl.take_context().expect("executed");

    assert!(group.stop()?);
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.cancel_kind(), Some(CancelKind::Stop));
    assert_eq!(ctl.stop_requests(), 1);
    assert_eq!(ctl.cancel_requests(), 0);
    assert_eq!(task.cancel_kind(), Some(CancelKind::Stop));

    ctx.cancelled();
    with_timeout(group.idle_handle().wait()).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_one_task_leaves_the_rest_running() -> TestResult {
    init_tracing();

    let group = TaskGroup::new(2)?;
    let (a, a_ctl) = ManualTask::handle("a");
    let (b, b_ctl) = ManualTask::handle("b");
    group.add_range([a.clone(), b.clone()])?;

    eventually(|| a_ctl.executes() == 1 && b_ctl.executes() == 1).await;
    let a_ctx = a_ctl.take_context().expect("executed");
    let b_ctx = b_ctl.take_context().expect("executed");

    assert!(a.cancel());
    assert!(a_ctx.is_cancelled());
    assert!(!b_ctx.is_cancelled());
    assert!(!group.is_cancel_requested());

    a_ctx.cancelled();
    eventually(|| group.remaining_tasks() == 1).await;
    assert!(!a.cancel(), "already finished");

    b_ctx.succeed();
    with_timeout(group.idle_handle().wait()).await;
    assert_eq!(group.completed_tasks(), 1);
    Ok(())
}
