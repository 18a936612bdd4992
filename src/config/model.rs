// src/config/model.rs

use serde::Deserialize;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [group]
/// max_running_tasks = 2
///
/// [simulation]
/// tasks = 5
/// steps = 10
/// step_ms = 50
/// fail_every = 0
/// ```
///
/// Both sections are optional and have defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub group: GroupSection,

    #[serde(default)]
    pub simulation: SimulationSection,
}

/// Validated configuration. Only obtainable through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub group: GroupSection,
    pub simulation: SimulationSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(group: GroupSection, simulation: SimulationSection) -> Self {
        Self { group, simulation }
    }
}

/// `[group]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSection {
    /// Ceiling on concurrently running tasks. Must be at least 1.
    #[serde(default = "default_max_running_tasks")]
    pub max_running_tasks: usize,
}

fn default_max_running_tasks() -> usize {
    2
}

impl Default for GroupSection {
    fn default() -> Self {
        Self {
            max_running_tasks: default_max_running_tasks(),
        }
    }
}

/// `[simulation]` section: the workload the binary runs.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSection {
    /// Number of simulated tasks to add.
    #[serde(default = "default_tasks")]
    pub tasks: usize,

    /// Progress steps per task.
    #[serde(default = "default_steps")]
    pub steps: u32,

    /// Delay between steps, in milliseconds.
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,

    /// Every n-th task fails instead of succeeding. 0 disables failures.
    #[serde(default)]
    pub fail_every: usize,
}

fn default_tasks() -> usize {
    5
}

fn default_steps() -> u32 {
    10
}

fn default_step_ms() -> u64 {
    50
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            tasks: default_tasks(),
            steps: default_steps(),
            step_ms: default_step_ms(),
            fail_every: 0,
        }
    }
}
