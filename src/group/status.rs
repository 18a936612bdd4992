// src/group/status.rs

//! Counters and the admission gate for one group.

use std::collections::HashSet;
use std::fmt;

use crate::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Busy,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Idle => f.write_str("idle"),
            Activity::Busy => f.write_str("busy"),
        }
    }
}

/// Point-in-time copy of a group's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatus {
    pub running: usize,
    pub pending: usize,
    pub remaining: usize,
    pub completed: usize,
    pub max_running: usize,
    pub activity: Activity,
}

/// Tracks running / pending / remaining / completed and decides whether
/// another task may be admitted.
///
/// Mutated only by the owning group under its lock. Every mutation marks
/// the status dirty; [`take_status_change`](Self::take_status_change)
/// turns that into at most one notification, and
/// [`suspend_update`](Self::suspend_update) holds notifications back so a
/// batch of changes is reported once.
#[derive(Debug)]
pub struct GroupStatusManager {
    running: usize,
    pending: HashSet<TaskId>,
    remaining: usize,
    completed: usize,
    max_running: usize,
    suspended: bool,
    dirty: bool,
    last_published: Option<GroupStatus>,
}

impl GroupStatusManager {
    pub fn new(max_running: usize) -> Self {
        Self {
            running: 0,
            pending: HashSet::new(),
            remaining: 0,
            completed: 0,
            max_running,
            suspended: false,
            dirty: false,
            last_published: None,
        }
    }

    /// Reserve a slot for `id`. Returns `false` when `running + pending`
    /// already reached the ceiling.
    pub fn register_pending(&mut self, id: TaskId) -> bool {
        if self.pending.contains(&id) {
            return true;
        }
        if self.running + self.pending.len() >= self.max_running {
            return false;
        }
        self.pending.insert(id);
        self.dirty = true;
        true
    }

    pub fn drop_pending(&mut self, id: TaskId) -> bool {
        let removed = self.pending.remove(&id);
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn increment_running(&mut self) {
        self.running += 1;
        self.dirty = true;
    }

    pub fn decrement_running(&mut self) {
        self.running = self.running.saturating_sub(1);
        self.dirty = true;
    }

    pub fn increment_completed(&mut self) {
        self.completed += 1;
        self.dirty = true;
    }

    pub fn add_remaining(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.remaining += n;
        self.dirty = true;
    }

    pub fn decrement_remaining(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        self.dirty = true;
    }

    pub fn set_max_running(&mut self, max_running: usize) {
        if self.max_running != max_running {
            self.max_running = max_running;
            self.dirty = true;
        }
    }

    /// While suspended, changes accumulate and
    /// [`take_status_change`](Self::take_status_change) yields nothing.
    pub fn suspend_update(&mut self, suspend: bool) {
        self.suspended = suspend;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Snapshot to publish, if counters changed since the last one.
    pub fn take_status_change(&mut self) -> Option<GroupStatus> {
        if self.suspended || !self.dirty {
            return None;
        }
        self.dirty = false;
        let status = self.snapshot();
        if self.last_published == Some(status) {
            return None;
        }
        self.last_published = Some(status);
        Some(status)
    }

    /// End of an execution session. `completed` is cumulative and kept.
    pub fn reset(&mut self) {
        self.running = 0;
        self.pending.clear();
        self.remaining = 0;
        self.suspended = false;
        self.dirty = true;
    }

    pub fn snapshot(&self) -> GroupStatus {
        GroupStatus {
            running: self.running,
            pending: self.pending.len(),
            remaining: self.remaining,
            completed: self.completed,
            max_running: self.max_running,
            activity: self.activity(),
        }
    }

    pub fn activity(&self) -> Activity {
        if self.remaining > 0 || self.running > 0 {
            Activity::Busy
        } else {
            Activity::Idle
        }
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn max_running(&self) -> usize {
        self.max_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<TaskId> {
        (0..n).map(|_| TaskId::next()).collect()
    }

    #[test]
    fn admission_respects_running_plus_pending() {
        let mut status = GroupStatusManager::new(2);
        let ids = ids(3);

        assert!(status.register_pending(ids[0]));
        assert!(status.register_pending(ids[1]));
        assert!(!status.register_pending(ids[2]));

        status.drop_pending(ids[0]);
        status.increment_running();
        assert!(!status.register_pending(ids[2]), "running still holds the slot");

        status.decrement_running();
        assert!(status.register_pending(ids[2]));
        assert_eq!(status.pending(), 2);
    }

    #[test]
    fn registering_the_same_task_twice_reserves_one_slot() {
        let mut status = GroupStatusManager::new(2);
        let id = TaskId::next();
        assert!(status.register_pending(id));
        assert!(status.register_pending(id));
        assert_eq!(status.pending(), 1);
    }

    #[test]
    fn zero_ceiling_admits_nothing() {
        let mut status = GroupStatusManager::new(0);
        assert!(!status.register_pending(TaskId::next()));
    }

    #[test]
    fn suspended_updates_are_reported_once() {
        let mut status = GroupStatusManager::new(4);
        status.add_remaining(3);
        assert!(status.take_status_change().is_some());

        status.suspend_update(true);
        status.increment_running();
        status.increment_completed();
        status.decrement_remaining();
        assert_eq!(status.take_status_change(), None);

        status.suspend_update(false);
        let change = status.take_status_change().unwrap();
        assert_eq!(change.running, 1);
        assert_eq!(change.completed, 1);
        assert_eq!(change.remaining, 2);
        assert_eq!(status.take_status_change(), None);
    }

    #[test]
    fn unchanged_snapshot_is_not_republished() {
        let mut status = GroupStatusManager::new(1);
        status.increment_running();
        assert!(status.take_status_change().is_some());

        status.increment_running();
        status.decrement_running();
        assert_eq!(status.take_status_change(), None);
    }

    #[test]
    fn reset_keeps_completed() {
        let mut status = GroupStatusManager::new(2);
        status.add_remaining(2);
        status.increment_completed();
        status.increment_running();
        status.register_pending(TaskId::next());

        status.reset();
        let snap = status.snapshot();
        assert_eq!(snap.running, 0);
        assert_eq!(snap.pending, 0);
        assert_eq!(snap.remaining, 0);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.activity, Activity::Idle);
    }

    #[test]
    fn activity_is_busy_while_work_remains() {
        let mut status = GroupStatusManager::new(1);
        assert_eq!(status.activity(), Activity::Idle);
        status.add_remaining(1);
        assert_eq!(status.activity(), Activity::Busy);
        status.decrement_remaining();
        assert_eq!(status.activity(), Activity::Idle);
    }
}
