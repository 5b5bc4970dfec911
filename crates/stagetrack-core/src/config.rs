//! Configuration types for the tracker.
//!
//! Configuration lives in `.stagetrack/config.toml` under a root directory.
//! Every key is optional; a missing file yields the defaults.
//!
//! ```toml
//! [tracker]
//! strict_lifecycle = true
//! default_actor = "site-office"
//!
//! [[workflows]]
//! name = "fit-out"
//! description = "Interior fit-out"
//!
//! [[workflows.stages]]
//! id = "strip"
//! name = "Strip Out"
//! position = 1
//!
//! [[workflows.stages]]
//! id = "rebuild"
//! name = "Rebuild"
//! position = 2
//! dependencies = ["strip"]
//! ```

use crate::error::{Result, StageError};
use crate::registry::StageDefinition;
use crate::validator::TransitionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the state directory under the root.
pub const STATE_DIR: &str = ".stagetrack";

/// Main tracker configuration.
///
/// Paths are always derived from `root`; only the settings and custom
/// workflows come from the config file.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Root directory the tracker operates in.
    pub root: PathBuf,

    /// State directory (`.stagetrack`).
    pub state_dir: PathBuf,

    /// Path to the configuration file (`.stagetrack/config.toml`).
    pub config_file: PathBuf,

    /// Directory holding one JSON file per project (`.stagetrack/projects`).
    pub data_dir: PathBuf,

    /// Directory with notification template overrides (`.stagetrack/templates`).
    pub templates_dir: PathBuf,

    /// Tracker behavior settings.
    pub tracker: TrackerSettings,

    /// Custom workflows declared in the config file.
    pub workflows: Vec<WorkflowConfig>,
}

/// Tracker behavior settings, the `[tracker]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Reject transitions outside the modeled lifecycle.
    pub strict_lifecycle: bool,

    /// Actor recorded when the caller does not name one.
    pub default_actor: String,

    /// Whether the built-in workflows are registered.
    pub builtin_workflows: bool,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            strict_lifecycle: false,
            default_actor: "system".to_string(),
            builtin_workflows: true,
        }
    }
}

/// A custom workflow, one `[[workflows]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Workflow type name used by `create`.
    pub name: String,

    /// Short description shown in listings.
    #[serde(default)]
    pub description: String,

    /// Stage definitions.
    #[serde(default)]
    pub stages: Vec<StageDefinition>,
}

/// On-disk shape of `config.toml`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    tracker: TrackerSettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    workflows: Vec<WorkflowConfig>,
}

impl TrackerConfig {
    /// Creates a configuration with defaults rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        let state_dir = root.join(STATE_DIR);
        Self {
            config_file: state_dir.join("config.toml"),
            data_dir: state_dir.join("projects"),
            templates_dir: state_dir.join("templates"),
            state_dir,
            root,
            tracker: TrackerSettings::default(),
            workflows: Vec::new(),
        }
    }

    /// Loads the configuration under `root`.
    ///
    /// A missing config file is not an error; defaults are used.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `StageError::FileReadError` if the file exists but cannot be read
    /// - `StageError::ConfigParseError` if the TOML is malformed
    /// - `StageError::InvalidConfig` if a custom workflow is unnamed or
    ///   declared twice
    pub fn load(root: PathBuf) -> Result<Self> {
        let mut config = Self::new(root);

        if !config.config_file.exists() {
            tracing::debug!(path = %config.config_file.display(), "no config file, using defaults");
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config.config_file).map_err(|e| {
            StageError::FileReadError(format!("{}: {}", config.config_file.display(), e))
        })?;
        let file = Self::parse(&content)?;

        config.tracker = file.tracker;
        config.workflows = file.workflows;
        config.validate()?;

        tracing::debug!(
            path = %config.config_file.display(),
            workflows = config.workflows.len(),
            "config loaded"
        );
        Ok(config)
    }

    fn parse(content: &str) -> Result<ConfigFile> {
        toml::from_str(content).map_err(|e| StageError::ConfigParseError(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for workflow in &self.workflows {
            if workflow.name.trim().is_empty() {
                return Err(StageError::InvalidConfig(
                    "workflow name must not be empty".to_string(),
                ));
            }
            if !seen.insert(workflow.name.as_str()) {
                return Err(StageError::InvalidConfig(format!(
                    "workflow '{}' declared more than once",
                    workflow.name
                )));
            }
        }
        Ok(())
    }

    /// Serializes the settings and custom workflows back to TOML.
    ///
    /// # Errors
    ///
    /// Returns `StageError::InvalidConfig` if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        let file = ConfigFile {
            tracker: self.tracker.clone(),
            workflows: self.workflows.clone(),
        };
        toml::to_string_pretty(&file).map_err(|e| StageError::InvalidConfig(e.to_string()))
    }

    /// Writes the configuration file, creating the state directory.
    ///
    /// # Errors
    ///
    /// Returns `StageError::FileWriteError` if the file cannot be written.
    pub fn save(&self) -> Result<()> {
        let content = self.to_toml()?;
        write_file(&self.config_file, &content)
    }

    /// Transition policy derived from the settings.
    pub fn policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            strict_lifecycle: self.tracker.strict_lifecycle,
        }
    }

    /// Whether the state directory has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, content)
        .map_err(|e| StageError::FileWriteError(format!("{}: {}", path.display(), e)))
}
