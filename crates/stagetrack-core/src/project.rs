//! Project identity, persisted shape and progress summary.

use crate::error::{Result, StageError};
use crate::registry::StageRegistry;
use crate::status::StageStatus;
use crate::store::{StageInstance, StageStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque project identifier.
///
/// Restricted to ASCII alphanumerics, `-` and `_` so it can double as a file
/// name in file-backed repositories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validates and wraps an existing id.
    ///
    /// # Errors
    ///
    /// Returns `StageError::InvalidProjectId` for empty ids or ids containing
    /// characters other than ASCII alphanumerics, `-` and `_`.
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= 128
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(id))
        } else {
            Err(StageError::InvalidProjectId(id))
        }
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProjectId {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Persisted form of a project: its identity plus flat stage records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project id.
    pub id: ProjectId,
    /// Workflow type the stages were seeded from.
    pub workflow: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// One record per stage, in registry order.
    pub stages: Vec<StageInstance>,
}

impl ProjectRecord {
    /// Creates a record for a new project seeded from `registry`.
    pub fn seed(id: ProjectId, registry: &StageRegistry) -> Self {
        let now = Utc::now();
        Self {
            id,
            workflow: registry.workflow().to_string(),
            created_at: now,
            updated_at: now,
            stages: StageStore::initialize(registry).into_records(),
        }
    }
}

/// Point-in-time progress overview of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    /// Project id.
    pub project_id: ProjectId,
    /// Workflow type.
    pub workflow: String,
    /// Number of stages.
    pub total_stages: usize,
    /// Number of stages in a terminal status.
    pub terminal_stages: usize,
    /// Share of terminal stages, rounded down, 0-100.
    pub completion_percentage: u8,
    /// Stages being worked on (`in_progress` or `in_review`).
    pub active: Vec<String>,
    /// Stages that are `delayed` or `blocked`.
    pub stalled: Vec<String>,
    /// `not_started` stages whose dependencies are all terminal.
    pub ready: Vec<String>,
    /// Longest chain of stages by estimated duration.
    pub critical_path: Vec<String>,
    /// Estimated days of the critical path still outstanding.
    pub remaining_critical_days: u32,
}

impl ProjectSummary {
    /// Builds a summary from the project's current store.
    pub fn compute(project_id: &ProjectId, registry: &StageRegistry, store: &StageStore) -> Self {
        let mut summary = Self {
            project_id: project_id.clone(),
            workflow: registry.workflow().to_string(),
            total_stages: store.len(),
            terminal_stages: 0,
            completion_percentage: 0,
            active: Vec::new(),
            stalled: Vec::new(),
            ready: Vec::new(),
            critical_path: Vec::new(),
            remaining_critical_days: 0,
        };

        for instance in store.instances() {
            match instance.status {
                s if s.is_terminal() => summary.terminal_stages += 1,
                StageStatus::InProgress | StageStatus::InReview => {
                    summary.active.push(instance.stage_id.clone())
                }
                s if s.is_stalled() => summary.stalled.push(instance.stage_id.clone()),
                StageStatus::NotStarted => {
                    let deps_done = registry.get(&instance.stage_id).is_some_and(|stage| {
                        stage.dependencies.iter().all(|dep| {
                            store.status_of(dep).is_ok_and(|status| status.is_terminal())
                        })
                    });
                    if deps_done {
                        summary.ready.push(instance.stage_id.clone());
                    }
                }
                _ => {}
            }
        }

        if summary.total_stages > 0 {
            summary.completion_percentage =
                (summary.terminal_stages * 100 / summary.total_stages) as u8;
        }

        let (path, _) = registry.critical_path();
        summary.remaining_critical_days = path
            .iter()
            .filter(|id| !store.status_of(id).is_ok_and(|s| s.is_terminal()))
            .filter_map(|id| registry.get(id).and_then(|s| s.estimated_days))
            .fold(0u32, u32::saturating_add);
        summary.critical_path = path;

        summary
    }
}
