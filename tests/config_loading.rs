// tests/config_loading.rs

use std::io::Write;
use tempfile::NamedTempFile;
use taskgroup::TaskGroup;
use taskgroup::config::{load_and_validate, load_from_path};
use taskgroup::errors::TaskGroupError;

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn empty_file_uses_defaults() {
    let file = config_file("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.group.max_running_tasks, 2);
    assert_eq!(cfg.simulation.tasks, 5);
    assert_eq!(cfg.simulation.steps, 10);
    assert_eq!(cfg.simulation.step_ms, 50);
    assert_eq!(cfg.simulation.fail_every, 0);
}

#[test]
fn values_from_file_override_defaults() {
    let file = config_file(
        r#"
[group]
max_running_tasks = 4

[simulation]
tasks = 12
fail_every = 3
"#,
    );
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.group.max_running_tasks, 4);
    assert_eq!(cfg.simulation.tasks, 12);
    assert_eq!(cfg.simulation.fail_every, 3);
    assert_eq!(cfg.simulation.steps, 10, "unset keys keep their default");
}

#[test]
fn zero_ceiling_returns_config_error() {
    let file = config_file("[group]\nmax_running_tasks = 0\n");

    // The raw loader accepts it; validation does not.
    assert_eq!(load_from_path(file.path()).unwrap().group.max_running_tasks, 0);

    match load_and_validate(file.path()) {
        Err(TaskGroupError::ConfigError(msg)) => {
            assert!(msg.contains("max_running_tasks"), "unexpected message: {msg}");
        }
        other => panic!("Expected ConfigError, got: {other:?}"),
    }
}

#[test]
fn zero_steps_returns_config_error() {
    let file = config_file("[simulation]\nsteps = 0\n");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskGroupError::ConfigError(_))
    ));
}

#[test]
fn malformed_toml_returns_toml_error() {
    let file = config_file("[group\nmax_running_tasks = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TaskGroupError::TomlError(_))
    ));
}

#[test]
fn wrong_type_returns_toml_error() {
    let file = config_file("[group]\nmax_running_tasks = \"many\"\n");
    assert!(matches!(
        load_from_path(file.path()),
        Err(TaskGroupError::TomlError(_))
    ));
}

#[test]
fn missing_file_returns_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("TaskGroup.toml");
    assert!(matches!(
        load_and_validate(&path),
        Err(TaskGroupError::IoError(_))
    ));
}

#[tokio::test]
async fn group_section_sets_the_ceiling() {
    let file = config_file("[group]\nmax_running_tasks = 3\n");
    let cfg = load_and_validate(file.path()).unwrap();

    let group = TaskGroup::from_config(&cfg.group).unwrap();
    assert_eq!(group.max_running_tasks(), 3);
    assert_eq!(group.status().max_running, 3);
}
