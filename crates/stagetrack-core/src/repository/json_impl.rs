//! JSON file project repository.
//!
//! Each project lives in `<dir>/<project-id>.json`. New projects are created
//! with `create_new`, so two writers can never both claim an id. Updates go
//! to a temporary sibling file that is then renamed over the target, so a
//! crash mid-write never leaves a half-written project behind.

use crate::error::{Result, StageError};
use crate::project::{ProjectId, ProjectRecord};
use crate::repository::ProjectRepository;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "json";

/// Project repository storing one pretty-printed JSON file per project.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Creates a repository rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StageError::FileWriteError` if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    /// Directory holding the project files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ProjectId) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", id.as_str()))
    }

    fn write_record(&self, record: &ProjectRecord) -> Result<()> {
        let path = self.path_for(&record.id);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", path.display(), e)))?;

        std::fs::write(&tmp, content)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", tmp.display(), e)))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", path.display(), e)))
    }
}

impl ProjectRepository for JsonFileRepository {
    fn insert(&self, record: &ProjectRecord) -> Result<()> {
        let path = self.path_for(&record.id);
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", path.display(), e)))?;

        // create_new makes the existence check and the create one step
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    StageError::ProjectExists(record.id.to_string())
                } else {
                    StageError::FileWriteError(format!("{}: {}", path.display(), e))
                }
            })?;
        file.write_all(content.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| StageError::FileWriteError(format!("{}: {}", path.display(), e)))
    }

    fn load(&self, id: &ProjectId) -> Result<ProjectRecord> {
        let path = self.path_for(id);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StageError::ProjectNotFound(id.to_string())
            } else {
                StageError::FileReadError(format!("{}: {}", path.display(), e))
            }
        })?;

        let record: ProjectRecord = serde_json::from_str(&content).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse project file");
            StageError::CorruptedState(path.clone())
        })?;

        if record.id != *id {
            tracing::warn!(path = %path.display(), stored = %record.id, "project id mismatch");
            return Err(StageError::CorruptedState(path));
        }

        Ok(record)
    }

    fn save(&self, record: &ProjectRecord) -> Result<()> {
        if !self.exists(&record.id) {
            return Err(StageError::ProjectNotFound(record.id.to_string()));
        }
        self.write_record(record)
    }

    fn delete(&self, id: &ProjectId) -> Result<()> {
        let path = self.path_for(id);
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StageError::ProjectNotFound(id.to_string())
            } else {
                StageError::FileWriteError(format!("{}: {}", path.display(), e))
            }
        })
    }

    fn list(&self) -> Result<Vec<ProjectId>> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| StageError::FileReadError(format!("{}: {}", self.dir.display(), e)))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                StageError::FileReadError(format!("failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            // Skip anything that could not have been written by this repository
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(id) = ProjectId::parse(stem)
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &ProjectId) -> bool {
        self.path_for(id).is_file()
    }
}
