//! Integration tests for configuration loading.

use stagetrack_core::{StageError, TrackerConfig, WorkflowCatalog};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_load_defaults_when_missing() {
    let temp_dir = TempDir::new().unwrap();

    let config = TrackerConfig::load(temp_dir.path().to_path_buf()).unwrap();

    assert_eq!(config.root, temp_dir.path().to_path_buf());
    assert_eq!(config.data_dir, temp_dir.path().join(".stagetrack/projects"));
    assert!(!config.tracker.strict_lifecycle);
    assert_eq!(config.tracker.default_actor, "system");
    assert!(config.workflows.is_empty());
    assert!(!config.is_initialized());
}

#[test]
fn test_config_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join(".stagetrack");
    fs::create_dir_all(&state_dir).unwrap();

    let config_content = r#"
[tracker]
strict_lifecycle = true
default_actor = "site-office"

[[workflows]]
name = "snagging"
description = "Post-completion snag list"

[[workflows.stages]]
id = "inspect"
name = "Inspection"
position = 1
estimated_days = 2

[[workflows.stages]]
id = "remedy"
name = "Remedial Works"
position = 2
dependencies = ["inspect"]
"#;
    fs::write(state_dir.join("config.toml"), config_content).unwrap();

    let config = TrackerConfig::load(temp_dir.path().to_path_buf()).unwrap();

    assert!(config.tracker.strict_lifecycle);
    assert!(config.policy().strict_lifecycle);
    assert_eq!(config.tracker.default_actor, "site-office");
    assert_eq!(config.workflows.len(), 1);

    let catalog = WorkflowCatalog::from_config(&config).unwrap();
    assert!(catalog.names().contains(&"snagging"));
    assert!(catalog.names().contains(&"conveyancing"));
    assert_eq!(catalog.get("snagging").unwrap().dependents("inspect"), ["remedy"]);
}

#[test]
fn test_config_invalid_toml_fails() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join(".stagetrack");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("config.toml"), "invalid { toml").unwrap();

    let result = TrackerConfig::load(temp_dir.path().to_path_buf());
    assert!(matches!(result, Err(StageError::ConfigParseError(_))));
}

#[test]
fn test_config_partial_overrides() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join(".stagetrack");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(state_dir.join("config.toml"), "[tracker]\nbuiltin_workflows = false\n").unwrap();

    let config = TrackerConfig::load(temp_dir.path().to_path_buf()).unwrap();

    assert!(!config.tracker.builtin_workflows);
    // Untouched keys keep their defaults
    assert_eq!(config.tracker.default_actor, "system");
    assert!(WorkflowCatalog::from_config(&config).unwrap().is_empty());
}

#[test]
fn test_custom_workflow_with_unknown_dependency_fails() {
    let temp_dir = TempDir::new().unwrap();
    let state_dir = temp_dir.path().join(".stagetrack");
    fs::create_dir_all(&state_dir).unwrap();
    fs::write(
        state_dir.join("config.toml"),
        r#"
[[workflows]]
name = "broken"

[[workflows.stages]]
id = "only"
name = "Only"
dependencies = ["missing"]
"#,
    )
    .unwrap();

    let config = TrackerConfig::load(temp_dir.path().to_path_buf()).unwrap();
    assert!(matches!(
        WorkflowCatalog::from_config(&config),
        Err(StageError::UnknownDependency { .. })
    ));
}

#[test]
fn test_save_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = TrackerConfig::new(temp_dir.path().to_path_buf());
    config.tracker.default_actor = "pm".to_string();
    config.save().unwrap();

    assert!(config.is_initialized());
    let loaded = TrackerConfig::load(temp_dir.path().to_path_buf()).unwrap();
    assert_eq!(loaded.tracker.default_actor, "pm");
}
