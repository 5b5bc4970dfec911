//! Error types for stage tracking operations.
//!
//! This module defines every failure mode of the tracker, from registry
//! construction through transitions to persistence. All errors use
//! `thiserror` so callers get precise variants with readable messages.

use crate::status::StageStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Comprehensive error type for stage tracking operations.
///
/// Each variant carries the context a caller needs to explain the failure,
/// e.g. the unmet dependency of a rejected transition.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StageError {
    // Registry errors
    /// The dependency graph of a workflow contains a cycle.
    #[error("circular dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Stage ids forming the cycle, first id repeated at the end.
        cycle: Vec<String>,
    },

    /// A stage declares a dependency that is not part of the same workflow.
    #[error("stage '{stage}' depends on unknown stage '{dependency}'")]
    UnknownDependency {
        /// Stage declaring the dependency.
        stage: String,
        /// The dependency id that could not be resolved.
        dependency: String,
    },

    /// Two stages of the same workflow share an id.
    #[error("duplicate stage id: {0}")]
    DuplicateStage(String),

    /// A workflow was defined without any stages.
    #[error("workflow '{0}' defines no stages")]
    EmptyWorkflow(String),

    /// A workflow with the same name is already registered.
    #[error("workflow already registered: {0}")]
    DuplicateWorkflow(String),

    // Lookup errors
    /// No workflow registered under this name.
    #[error("unknown workflow type: {0}")]
    UnknownWorkflow(String),

    /// Project id contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid project id: {0:?}")]
    InvalidProjectId(String),

    /// No project with this id.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// The stage id is unknown to the project's workflow.
    #[error("stage not found: {0}")]
    StageNotFound(String),

    // Transition errors
    /// Terminal status requested while a dependency is not terminal.
    #[error("cannot mark '{stage}' as {proposed}: dependency '{unmet_dependency}' is {dependency_status}")]
    Precondition {
        /// Stage whose transition was rejected.
        stage: String,
        /// Status that was requested.
        proposed: StageStatus,
        /// First unmet dependency in declaration order.
        unmet_dependency: String,
        /// Current status of that dependency.
        dependency_status: StageStatus,
    },

    /// Transition outside the modeled lifecycle (strict mode only).
    #[error("invalid transition for '{stage}' from {from} to {to}")]
    InvalidTransition {
        /// Stage whose transition was rejected.
        stage: String,
        /// Current status.
        from: StageStatus,
        /// Requested status.
        to: StageStatus,
    },

    /// Progress value rejected for the stage.
    #[error("invalid progress for '{stage}': {reason}")]
    InvalidProgress {
        /// Stage whose progress was rejected.
        stage: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Unrecognized status name.
    #[error("invalid status: {0}")]
    InvalidStatus(String),

    // Storage errors
    /// A persisted project could not be parsed.
    #[error("corrupted project file: {0}")]
    CorruptedState(PathBuf),

    /// Error reading a file.
    #[error("file read error: {0}")]
    FileReadError(String),

    /// Error writing a file.
    #[error("file write error: {0}")]
    FileWriteError(String),

    /// Project id already present in the repository.
    #[error("project already exists: {0}")]
    ProjectExists(String),

    // Config errors
    /// Invalid configuration detected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Error parsing the configuration file.
    #[error("config parse error: {0}")]
    ConfigParseError(String),

    /// Standard IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context from anyhow.
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Broad category of a [`StageError`], used by boundary layers to pick a
/// response (an HTTP route would map these to status codes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad workflow definition or config; fatal at startup.
    Configuration,
    /// Unknown project, stage or workflow.
    NotFound,
    /// Transition refused because of the current state.
    Precondition,
    /// Malformed request data.
    InvalidInput,
    /// Persistence failure.
    Storage,
}

impl ErrorKind {
    /// HTTP-equivalent status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Configuration => 500,
            ErrorKind::NotFound => 404,
            ErrorKind::Precondition => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Storage => 500,
        }
    }
}

impl StageError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::CyclicDependency { .. }
            | StageError::UnknownDependency { .. }
            | StageError::DuplicateStage(_)
            | StageError::EmptyWorkflow(_)
            | StageError::DuplicateWorkflow(_)
            | StageError::InvalidConfig(_)
            | StageError::ConfigParseError(_) => ErrorKind::Configuration,
            StageError::UnknownWorkflow(_)
            | StageError::ProjectNotFound(_)
            | StageError::StageNotFound(_) => ErrorKind::NotFound,
            StageError::Precondition { .. }
            | StageError::InvalidTransition { .. }
            | StageError::ProjectExists(_) => ErrorKind::Precondition,
            StageError::InvalidProgress { .. }
            | StageError::InvalidStatus(_)
            | StageError::InvalidProjectId(_) => ErrorKind::InvalidInput,
            StageError::CorruptedState(_)
            | StageError::FileReadError(_)
            | StageError::FileWriteError(_)
            | StageError::Io(_)
            | StageError::Anyhow(_) => ErrorKind::Storage,
        }
    }
}

/// Result type alias for stage tracking operations.
pub type Result<T> = std::result::Result<T, StageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_message_names_dependency() {
        let err = StageError::Precondition {
            stage: "exchange".to_string(),
            proposed: StageStatus::Completed,
            unmet_dependency: "mortgage".to_string(),
            dependency_status: StageStatus::InProgress,
        };
        assert_eq!(
            err.to_string(),
            "cannot mark 'exchange' as completed: dependency 'mortgage' is in_progress"
        );
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert_eq!(err.kind().http_status(), 409);
    }

    #[test]
    fn test_cycle_message_joins_path() {
        let err = StageError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> a");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = StageError::ProjectNotFound("p-1".to_string());
        assert_eq!(err.kind().http_status(), 404);
        assert_eq!(StageError::StageNotFound("x".into()).kind(), ErrorKind::NotFound);
    }
}
