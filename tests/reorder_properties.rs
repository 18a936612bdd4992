use std::collections::BTreeSet;

use proptest::prelude::*;
use taskgroup::group::GroupProgressManager;
use taskgroup::{EventPump, GroupEvent, TaskGroup, TaskHandle};
use taskgroup_test_utils::ManualTask;

/// A group with `n` tasks and a ceiling of zero, so nothing is dispatched
/// and the list only changes through the calls under test. The runtime is
/// never driven; it only has to exist for the group's pump to be spawned.
fn parked_group(n: usize) -> (tokio::runtime::Runtime, TaskGroup, Vec<TaskHandle>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let group = TaskGroup::with_runtime(0, runtime.handle().clone());
    let handles: Vec<TaskHandle> = (0..n)
        .map(|i| ManualTask::handle(&format!("t{i}")).0)
        .collect();
    group.add_range(handles.clone()).unwrap();
    (runtime, group, handles)
}

/// The most recent `Reordered` payload among the events queued so far.
fn last_reorder(pump: &mut EventPump<GroupEvent>) -> Option<Vec<usize>> {
    let mut last = None;
    while let Some(wrapper) = pump.try_recv() {
        if let GroupEvent::Reordered { new_order } = wrapper.event {
            last = Some(new_order);
        }
    }
    last
}

proptest! {
    #[test]
    fn move_indices_keeps_every_task_and_reports_the_permutation(
        n in 1..10usize,
        raw_sources in proptest::collection::vec(any::<usize>(), 0..6),
        raw_dest in any::<usize>(),
    ) {
        let (_runtime, group, handles) = parked_group(n);
        let mut pump = group.take_event_pump().unwrap();
        let _ = last_reorder(&mut pump);

        let sources: Vec<usize> = raw_sources.iter().map(|i| i % n).collect();
        let dest = raw_dest % (n + 1);
        let before = group.tasks();

        group.move_indices(dest, &sources).unwrap();
        let after = group.tasks();

        // Same tasks, possibly in a different order.
        let ids_before: BTreeSet<_> = before.iter().map(TaskHandle::id).collect();
        let ids_after: BTreeSet<_> = after.iter().map(TaskHandle::id).collect();
        prop_assert_eq!(ids_before, ids_after);
        prop_assert_eq!(after.len(), handles.len());

        // The moved tasks form one run, in list order, at the clamped dest.
        let moved: BTreeSet<usize> = sources.iter().copied().collect();
        let at = dest.min(n - moved.len());
        let expected_run: Vec<TaskHandle> = moved.iter().map(|&i| before[i].clone()).collect();
        prop_assert_eq!(&after[at..at + moved.len()], expected_run.as_slice());

        // Everything else keeps its relative order.
        let rest_before: Vec<&TaskHandle> = before
            .iter()
            .enumerate()
            .filter(|(i, _)| !moved.contains(i))
            .map(|(_, t)| t)
            .collect();
        let rest_after: Vec<&TaskHandle> = after[..at].iter().chain(&after[at + moved.len()..]).collect();
        prop_assert_eq!(rest_before, rest_after);

        // A reported order maps old positions onto new ones.
        match last_reorder(&mut pump) {
            Some(new_order) => {
                prop_assert_ne!(&before, &after);
                let rebuilt: Vec<TaskHandle> = new_order.iter().map(|&i| before[i].clone()).collect();
                prop_assert_eq!(rebuilt, after);
            }
            None => prop_assert_eq!(before, after),
        }
    }

    #[test]
    fn reversing_twice_restores_the_order(n in 2..10usize) {
        let (_runtime, group, handles) = parked_group(n);
        let mut pump = group.take_event_pump().unwrap();

        group.reverse().unwrap();
        let reversed: Vec<TaskHandle> = handles.iter().rev().cloned().collect();
        prop_assert_eq!(group.tasks(), reversed);
        let expected: Vec<usize> = (0..n).rev().collect();
        prop_assert_eq!(last_reorder(&mut pump), Some(expected));

        group.reverse().unwrap();
        prop_assert_eq!(group.tasks(), handles);
    }

    #[test]
    fn aggregate_progress_is_the_weighted_mean(
        entries in proptest::collection::vec((0..5u32, -20..130i32), 1..8),
        drop_first in any::<bool>(),
    ) {
        let mut progress = GroupProgressManager::new();
        let handles: Vec<TaskHandle> = entries
            .iter()
            .enumerate()
            .map(|(i, _)| ManualTask::handle(&format!("p{i}")).0)
            .collect();

        for (handle, (weight, percent)) in handles.iter().zip(&entries) {
            progress.add(handle.id(), *weight);
            progress.update(handle.id(), *percent);
        }

        let kept = if drop_first {
            progress.remove(handles[0].id());
            &entries[1..]
        } else {
            &entries[..]
        };

        let total: u64 = kept.iter().map(|(w, _)| u64::from(*w)).sum();
        let sum: u64 = kept
            .iter()
            .map(|(w, p)| u64::from(*w) * u64::from((*p).clamp(0, 100) as u32))
            .sum();
        let expected = if total == 0 { 0.0 } else { sum as f64 / total as f64 };

        prop_assert!((progress.aggregate() - expected).abs() < 1e-9);
        prop_assert!(progress.aggregate() >= 0.0 && progress.aggregate() <= 100.0);
        prop_assert_eq!(progress.len(), kept.len());
    }
}
