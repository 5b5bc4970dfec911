//! Per-project stage instance storage.
//!
//! The store is plain storage: it never checks preconditions. All status
//! changes are expected to pass through [`crate::validator`] first.

use crate::error::{Result, StageError};
use crate::registry::StageRegistry;
use crate::status::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-text note attached to a stage instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Who wrote the note (opaque id).
    pub author: String,
    /// Note body.
    pub text: String,
    /// When the note was added.
    pub created_at: DateTime<Utc>,
}

impl Note {
    /// Creates a note stamped with the current time.
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Mutable per-project record of one stage.
///
/// This is also the flat record persisted by repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInstance {
    /// Id of the stage definition in the registry.
    pub stage_id: String,
    /// Current status.
    pub status: StageStatus,
    /// Progress percentage, 0-100.
    pub progress: u8,
    /// Assigned party ids; not validated against any roster.
    #[serde(default)]
    pub assigned_parties: Vec<String>,
    /// Append-only notes.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl StageInstance {
    /// Creates a `NotStarted` instance with zero progress.
    pub fn new(stage_id: impl Into<String>) -> Self {
        Self {
            stage_id: stage_id.into(),
            status: StageStatus::NotStarted,
            progress: 0,
            assigned_parties: Vec::new(),
            notes: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial update of a stage instance. Absent fields are left untouched;
/// notes are always appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagePatch {
    /// New status.
    pub status: Option<StageStatus>,
    /// New progress.
    pub progress: Option<u8>,
    /// Replacement list of assigned parties.
    pub assigned_parties: Option<Vec<String>>,
    /// Notes to append.
    pub notes: Vec<Note>,
}

impl StagePatch {
    /// Patch that only changes the status.
    pub fn status(status: StageStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Sets the progress.
    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Replaces the assigned parties.
    #[must_use]
    pub fn with_assigned_parties(mut self, parties: Vec<String>) -> Self {
        self.assigned_parties = Some(parties);
        self
    }

    /// Appends a note.
    #[must_use]
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.push(note);
        self
    }

    /// Whether applying this patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.assigned_parties.is_none()
            && self.notes.is_empty()
    }
}

/// Stage instances of a single project, in registry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStore {
    instances: Vec<StageInstance>,
    index: HashMap<String, usize>,
}

impl StageStore {
    /// Seeds one `NotStarted` instance per registry stage.
    pub fn initialize(registry: &StageRegistry) -> Self {
        let instances = registry
            .stages()
            .iter()
            .map(|s| StageInstance::new(s.id.clone()))
            .collect();
        Self::from_ordered(instances)
    }

    /// Rebuilds a store from persisted records.
    ///
    /// Records are reordered to registry order; stages missing from the
    /// records (e.g. added to the workflow later) are seeded as `NotStarted`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::StageNotFound` if a record names a stage the
    /// registry does not define, and `StageError::InvalidProgress` if a
    /// record's progress exceeds 100.
    pub fn from_records(registry: &StageRegistry, records: Vec<StageInstance>) -> Result<Self> {
        let mut by_id: HashMap<String, StageInstance> = HashMap::with_capacity(records.len());
        for record in records {
            if !registry.contains(&record.stage_id) {
                return Err(StageError::StageNotFound(record.stage_id));
            }
            if record.progress > 100 {
                return Err(StageError::InvalidProgress {
                    stage: record.stage_id,
                    reason: format!("{} exceeds 100", record.progress),
                });
            }
            by_id.insert(record.stage_id.clone(), record);
        }

        let instances = registry
            .stages()
            .iter()
            .map(|s| {
                by_id
                    .remove(&s.id)
                    .unwrap_or_else(|| StageInstance::new(s.id.clone()))
            })
            .collect();
        Ok(Self::from_ordered(instances))
    }

    fn from_ordered(instances: Vec<StageInstance>) -> Self {
        let index = instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.stage_id.clone(), i))
            .collect();
        Self { instances, index }
    }

    /// Returns the instance for `stage_id`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::StageNotFound` if the id is unknown to this store.
    pub fn get(&self, stage_id: &str) -> Result<&StageInstance> {
        self.index
            .get(stage_id)
            .map(|&i| &self.instances[i])
            .ok_or_else(|| StageError::StageNotFound(stage_id.to_string()))
    }

    /// Current status of `stage_id`.
    pub fn status_of(&self, stage_id: &str) -> Result<StageStatus> {
        self.get(stage_id).map(|inst| inst.status)
    }

    /// Applies the fields present in `patch` and returns the new instance.
    ///
    /// # Errors
    ///
    /// Returns `StageError::StageNotFound` if the id is unknown to this store.
    pub fn update(&mut self, stage_id: &str, patch: StagePatch) -> Result<StageInstance> {
        let &i = self
            .index
            .get(stage_id)
            .ok_or_else(|| StageError::StageNotFound(stage_id.to_string()))?;
        let instance = &mut self.instances[i];

        if let Some(status) = patch.status {
            instance.status = status;
        }
        if let Some(progress) = patch.progress {
            instance.progress = progress;
        }
        if let Some(parties) = patch.assigned_parties {
            instance.assigned_parties = parties;
        }
        instance.notes.extend(patch.notes);
        instance.updated_at = Utc::now();

        Ok(instance.clone())
    }

    /// All instances in registry order.
    pub fn instances(&self) -> &[StageInstance] {
        &self.instances
    }

    /// Owned copy of all instances, for snapshots and persistence.
    pub fn snapshot(&self) -> Vec<StageInstance> {
        self.instances.clone()
    }

    /// Consumes the store, returning its records.
    pub fn into_records(self) -> Vec<StageInstance> {
        self.instances
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the store holds no instances.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageDefinition;

    fn registry() -> StageRegistry {
        StageRegistry::define(
            "abc",
            vec![
                StageDefinition::new("a", "A", 1),
                StageDefinition::new("b", "B", 2).depends_on(["a"]),
                StageDefinition::new("c", "C", 3).depends_on(["a", "b"]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_initialize_seeds_not_started() {
        let store = StageStore::initialize(&registry());
        assert_eq!(store.len(), 3);
        for inst in store.instances() {
            assert_eq!(inst.status, StageStatus::NotStarted);
            assert_eq!(inst.progress, 0);
            assert!(inst.notes.is_empty());
        }
    }

    #[test]
    fn test_get_unknown_stage() {
        let store = StageStore::initialize(&registry());
        assert!(matches!(
            store.get("zzz"),
            Err(StageError::StageNotFound(id)) if id == "zzz"
        ));
    }

    #[test]
    fn test_update_applies_only_present_fields() {
        let mut store = StageStore::initialize(&registry());
        store
            .update(
                "a",
                StagePatch::default().with_assigned_parties(vec!["lead_architect".into()]),
            )
            .unwrap();

        let updated = store
            .update("a", StagePatch::default().with_progress(40))
            .unwrap();

        assert_eq!(updated.progress, 40);
        assert_eq!(updated.status, StageStatus::NotStarted);
        assert_eq!(updated.assigned_parties, vec!["lead_architect".to_string()]);
    }

    #[test]
    fn test_notes_are_appended() {
        let mut store = StageStore::initialize(&registry());
        store
            .update("b", StagePatch::default().with_note(Note::new("pm", "kickoff")))
            .unwrap();
        let updated = store
            .update("b", StagePatch::default().with_note(Note::new("pm", "site visit")))
            .unwrap();

        let texts: Vec<&str> = updated.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["kickoff", "site visit"]);
    }

    #[test]
    fn test_from_records_reorders_and_seeds_missing() {
        let reg = registry();
        let mut c = StageInstance::new("c");
        c.status = StageStatus::InProgress;
        let mut a = StageInstance::new("a");
        a.status = StageStatus::Approved;
        a.progress = 100;

        let store = StageStore::from_records(&reg, vec![c, a]).unwrap();
        let ids: Vec<&str> = store.instances().iter().map(|i| i.stage_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.status_of("a").unwrap(), StageStatus::Approved);
        assert_eq!(store.status_of("b").unwrap(), StageStatus::NotStarted);
        assert_eq!(store.status_of("c").unwrap(), StageStatus::InProgress);
    }

    #[test]
    fn test_from_records_rejects_unknown_stage() {
        let result = StageStore::from_records(&registry(), vec![StageInstance::new("ghost")]);
        assert!(matches!(result, Err(StageError::StageNotFound(id)) if id == "ghost"));
    }

    #[test]
    fn test_instance_record_shape() {
        let inst = StageInstance::new("a");
        let value = serde_json::to_value(&inst).unwrap();
        assert_eq!(value["stage_id"], "a");
        assert_eq!(value["status"], "not_started");
        assert_eq!(value["progress"], 0);
        assert!(value["assigned_parties"].as_array().unwrap().is_empty());
    }
}
