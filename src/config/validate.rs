// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TaskGroupError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskGroupError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.group, raw.simulation))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_group(cfg)?;
    validate_simulation(cfg)?;
    Ok(())
}

fn validate_group(cfg: &RawConfigFile) -> Result<()> {
    if cfg.group.max_running_tasks == 0 {
        return Err(TaskGroupError::ConfigError(
            "[group].max_running_tasks must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_simulation(cfg: &RawConfigFile) -> Result<()> {
    let sim = &cfg.simulation;
    if sim.tasks == 0 {
        return Err(TaskGroupError::ConfigError(
            "[simulation].tasks must be >= 1 (got 0)".to_string(),
        ));
    }
    if sim.steps == 0 {
        return Err(TaskGroupError::ConfigError(
            "[simulation].steps must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> RawConfigFile {
        toml::from_str(toml_src).expect("valid TOML")
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = ConfigFile::try_from(parse("")).unwrap();
        assert_eq!(cfg.group.max_running_tasks, 2);
        assert_eq!(cfg.simulation.tasks, 5);
        assert_eq!(cfg.simulation.steps, 10);
        assert_eq!(cfg.simulation.step_ms, 50);
        assert_eq!(cfg.simulation.fail_every, 0);
    }

    #[test]
    fn zero_ceiling_is_rejected() {
        let err = ConfigFile::try_from(parse("[group]\nmax_running_tasks = 0\n")).unwrap_err();
        assert!(
            matches!(err, TaskGroupError::ConfigError(ref msg) if msg.contains("max_running_tasks")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn zero_steps_is_rejected() {
        let err = ConfigFile::try_from(parse("[simulation]\nsteps = 0\n")).unwrap_err();
        assert!(matches!(err, TaskGroupError::ConfigError(_)));
    }

    #[test]
    fn zero_tasks_is_rejected() {
        let err = ConfigFile::try_from(parse("[simulation]\ntasks = 0\n")).unwrap_err();
        assert!(matches!(err, TaskGroupError::ConfigError(_)));
    }
}
