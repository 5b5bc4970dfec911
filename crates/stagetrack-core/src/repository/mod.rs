//! Persistence boundary for projects.
//!
//! The coordinator never touches storage directly; it goes through a
//! [`ProjectRepository`] injected at construction. Two implementations ship
//! with the crate:
//!
//! - [`memory::MemoryRepository`]: in-process map, for tests and embedding
//! - [`json_impl::JsonFileRepository`]: one JSON file per project

pub mod json_impl;
pub mod memory;

use crate::error::Result;
use crate::project::{ProjectId, ProjectRecord};

/// Storage for project records keyed by project id.
///
/// Implementations must be safe to share between threads. They are not
/// required to serialize writers: the coordinator holds a per-project lock
/// around every load-modify-save cycle.
pub trait ProjectRepository: Send + Sync {
    /// Stores a new project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectExists` if the id is already stored.
    fn insert(&self, record: &ProjectRecord) -> Result<()>;

    /// Loads a project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` if the id is unknown, or a
    /// storage error if the record cannot be read.
    fn load(&self, id: &ProjectId) -> Result<ProjectRecord>;

    /// Overwrites an existing project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` if the id is unknown.
    fn save(&self, record: &ProjectRecord) -> Result<()>;

    /// Removes a project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` if the id is unknown.
    fn delete(&self, id: &ProjectId) -> Result<()>;

    /// Lists stored project ids, sorted.
    fn list(&self) -> Result<Vec<ProjectId>>;

    /// Checks if a project is stored.
    fn exists(&self, id: &ProjectId) -> bool;
}
