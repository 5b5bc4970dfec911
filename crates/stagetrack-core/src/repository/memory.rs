//! In-memory project repository.

use crate::error::{Result, StageError};
use crate::project::{ProjectId, ProjectRecord};
use crate::repository::ProjectRepository;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Project repository backed by a `HashMap`.
///
/// Clones share the same storage, so a test can keep a handle to inspect
/// what the coordinator wrote.
///
/// # Examples
///
/// ```
/// use stagetrack_core::repository::ProjectRepository;
/// use stagetrack_core::repository::memory::MemoryRepository;
/// use stagetrack_core::ProjectId;
///
/// let repo = MemoryRepository::new();
/// assert!(!repo.exists(&ProjectId::parse("site-1").unwrap()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    projects: Arc<Mutex<HashMap<ProjectId, ProjectRecord>>>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the repository with records.
    pub fn with_records(records: Vec<ProjectRecord>) -> Self {
        let projects = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            projects: Arc::new(Mutex::new(projects)),
        }
    }

    /// Number of stored projects.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no project is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProjectId, ProjectRecord>> {
        self.projects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProjectRepository for MemoryRepository {
    fn insert(&self, record: &ProjectRecord) -> Result<()> {
        let mut projects = self.lock();
        if projects.contains_key(&record.id) {
            return Err(StageError::ProjectExists(record.id.to_string()));
        }
        projects.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &ProjectId) -> Result<ProjectRecord> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StageError::ProjectNotFound(id.to_string()))
    }

    fn save(&self, record: &ProjectRecord) -> Result<()> {
        match self.lock().get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StageError::ProjectNotFound(record.id.to_string())),
        }
    }

    fn delete(&self, id: &ProjectId) -> Result<()> {
        self.lock()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StageError::ProjectNotFound(id.to_string()))
    }

    fn list(&self) -> Result<Vec<ProjectId>> {
        let mut ids: Vec<ProjectId> = self.lock().keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &ProjectId) -> bool {
        self.lock().contains_key(id)
    }
}
