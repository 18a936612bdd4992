// src/group/progress.rs

use std::collections::HashMap;

use crate::types::{TaskId, clamp_percent};

#[derive(Debug, Clone, Copy)]
struct Entry {
    percent: u8,
    weight: u32,
}

/// Weighted aggregate of per-task progress.
///
/// Mutators return the new rounded percentage only when it differs from
/// the last one they returned.
#[derive(Debug, Default)]
pub struct GroupProgressManager {
    entries: HashMap<TaskId, Entry>,
    last: u8,
}

impl GroupProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `id` at 0 %.
    pub fn add(&mut self, id: TaskId, weight: u32) -> Option<u8> {
        self.entries.insert(id, Entry { percent: 0, weight });
        self.publish()
    }

    /// Record a new percentage for `id`; values are clamped into 0..=100.
    /// Untracked ids are ignored.
    pub fn update(&mut self, id: TaskId, percent: i32) -> Option<u8> {
        let entry = self.entries.get_mut(&id)?;
        entry.percent = clamp_percent(percent);
        self.publish()
    }

    pub fn remove(&mut self, id: TaskId) -> Option<u8> {
        self.entries.remove(&id)?;
        self.publish()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.last = 0;
    }

    /// Weighted mean in percent. Zero when nothing is tracked or every
    /// weight is zero.
    pub fn aggregate(&self) -> f64 {
        let (sum, total) = self
            .entries
            .values()
            .fold((0u64, 0u64), |(sum, total), e| {
                (
                    sum + u64::from(e.percent) * u64::from(e.weight),
                    total + u64::from(e.weight),
                )
            });
        if total == 0 {
            return 0.0;
        }
        sum as f64 / total as f64
    }

    /// Aggregate rounded to whole percent.
    pub fn percent(&self) -> u8 {
        self.aggregate().round().clamp(0.0, 100.0) as u8
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn publish(&mut self) -> Option<u8> {
        let percent = self.percent();
        if percent == self.last {
            return None;
        }
        self.last = percent;
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mean_with_unit_weights() {
        let mut progress = GroupProgressManager::new();
        let (a, b) = (TaskId::next(), TaskId::next());
        progress.add(a, 1);
        progress.add(b, 1);

        assert_eq!(progress.update(a, 50), Some(25));
        assert_eq!(progress.update(b, 100), Some(75));
        assert_eq!(progress.aggregate(), 75.0);
    }

    #[test]
    fn weights_skew_the_mean() {
        let mut progress = GroupProgressManager::new();
        let (heavy, light) = (TaskId::next(), TaskId::next());
        progress.add(heavy, 3);
        progress.add(light, 1);

        progress.update(heavy, 100);
        assert_eq!(progress.percent(), 75);
    }

    #[test]
    fn removing_drops_the_contribution() {
        let mut progress = GroupProgressManager::new();
        let (a, b) = (TaskId::next(), TaskId::next());
        progress.add(a, 1);
        progress.add(b, 1);
        progress.update(a, 100);
        assert_eq!(progress.percent(), 50);

        assert_eq!(progress.remove(b), Some(100));
        assert_eq!(progress.remove(b), None);
        assert_eq!(progress.len(), 1);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut progress = GroupProgressManager::new();
        let id = TaskId::next();
        progress.add(id, 1);
        assert_eq!(progress.update(id, 400), Some(100));
        assert_eq!(progress.update(id, -20), Some(0));
    }

    #[test]
    fn unchanged_percent_is_not_reported() {
        let mut progress = GroupProgressManager::new();
        let id = TaskId::next();
        assert_eq!(progress.add(id, 1), None);
        assert_eq!(progress.update(id, 0), None);
        assert_eq!(progress.update(TaskId::next(), 50), None, "untracked id");
    }

    #[test]
    fn empty_or_weightless_is_zero() {
        let mut progress = GroupProgressManager::new();
        assert_eq!(progress.aggregate(), 0.0);
        let id = TaskId::next();
        progress.add(id, 0);
        progress.update(id, 80);
        assert_eq!(progress.aggregate(), 0.0);

        progress.reset();
        assert!(progress.is_empty());
    }
}
