//! Project coordinator: the inbound boundary of the tracker.
//!
//! The coordinator ties the pieces together. A transition request runs, under
//! the project's lock:
//!
//! 1. load the project from the repository
//! 2. validate the requested change
//! 3. apply it to the stage store
//! 4. cascade into ready dependents if the stage became terminal
//! 5. save the project
//!
//! Events are emitted after the lock is released, so subscribers may call
//! back into the coordinator. Each project queues the events of committed
//! updates and delivers them in commit order.

use crate::catalog::WorkflowCatalog;
use crate::cascade;
use crate::config::TrackerConfig;
use crate::error::{ErrorKind, Result, StageError};
use crate::events::{Publisher, StageEvent};
use crate::project::{ProjectId, ProjectRecord, ProjectSummary};
use crate::registry::StageRegistry;
use crate::repository::ProjectRepository;
use crate::repository::json_impl::JsonFileRepository;
use crate::status::StageStatus;
use crate::store::{StageInstance, StagePatch, StageStore};
use crate::validator::{self, TransitionPolicy};
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Inbound operations of a stage tracker.
///
/// Implemented by [`ProjectCoordinator`]; boundary layers (CLI, HTTP) can
/// depend on this trait instead of the concrete type.
pub trait StageTracker {
    /// Creates a project of `workflow` type with every stage `not_started`.
    fn create_project(&self, workflow: &str) -> Result<ProjectId>;

    /// Requests a status change for one stage.
    ///
    /// Re-requesting the current status succeeds without side effects.
    fn request_stage_transition(
        &self,
        project_id: &ProjectId,
        stage_id: &str,
        new_status: StageStatus,
        actor: &str,
    ) -> Result<TransitionOutcome>;

    /// Returns every stage instance of a project, in registry order.
    fn get_project_stage_snapshot(&self, project_id: &ProjectId) -> Result<Vec<StageInstance>>;
}

/// Result of an accepted update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    /// The stage instance after the update.
    pub instance: StageInstance,
    /// Status before the update.
    pub previous_status: StageStatus,
    /// Whether anything was written.
    pub changed: bool,
    /// Dependents moved to `in_progress` by the cascade.
    pub auto_advanced: Vec<String>,
}

/// Coordinates projects, validation, cascade, persistence and events.
///
/// # Examples
///
/// ```
/// use stagetrack_core::repository::memory::MemoryRepository;
/// use stagetrack_core::{
///     EventBus, ProjectCoordinator, StageStatus, StageTracker, WorkflowCatalog,
/// };
/// use std::sync::Arc;
///
/// # fn main() -> stagetrack_core::Result<()> {
/// let coordinator = ProjectCoordinator::new(
///     WorkflowCatalog::builtin()?,
///     Arc::new(MemoryRepository::new()),
///     Arc::new(EventBus::new()),
/// );
///
/// let project = coordinator.create_project("conveyancing")?;
/// let outcome = coordinator.request_stage_transition(
///     &project,
///     "instruction",
///     StageStatus::Completed,
///     "solicitor",
/// )?;
/// assert_eq!(outcome.auto_advanced, vec!["searches", "survey"]);
/// # Ok(())
/// # }
/// ```
pub struct ProjectCoordinator {
    catalog: WorkflowCatalog,
    repository: Arc<dyn ProjectRepository>,
    publisher: Arc<dyn Publisher>,
    policy: TransitionPolicy,
    slots: Mutex<HashMap<ProjectId, Arc<ProjectSlot>>>,
}

/// Per-project synchronization, present only while the project exists.
#[derive(Default)]
struct ProjectSlot {
    /// Held across load, validate, update, cascade and save.
    state: Mutex<()>,
    /// Events of committed updates, in commit order.
    outbox: Mutex<Outbox>,
    /// Set when the project is deleted; waiters must look the slot up again.
    retired: AtomicBool,
}

#[derive(Default)]
struct Outbox {
    pending: VecDeque<StageEvent>,
    delivering: bool,
}

impl ProjectCoordinator {
    /// Creates a coordinator with the default (lenient) transition policy.
    pub fn new(
        catalog: WorkflowCatalog,
        repository: Arc<dyn ProjectRepository>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            catalog,
            repository,
            publisher,
            policy: TransitionPolicy::default(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a coordinator from configuration: catalog from the config,
    /// JSON file storage in the data directory, policy from the settings.
    ///
    /// # Errors
    ///
    /// Returns catalog construction errors or a storage error if the data
    /// directory cannot be created.
    pub fn from_config(config: &TrackerConfig, publisher: Arc<dyn Publisher>) -> Result<Self> {
        let catalog = WorkflowCatalog::from_config(config)?;
        let repository = JsonFileRepository::open(&config.data_dir)?;
        Ok(Self::new(catalog, Arc::new(repository), publisher).with_policy(config.policy()))
    }

    /// Replaces the transition policy.
    #[must_use]
    pub fn with_policy(mut self, policy: TransitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The workflow catalog.
    pub fn catalog(&self) -> &WorkflowCatalog {
        &self.catalog
    }

    /// The active transition policy.
    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Creates a project with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `StageError::UnknownWorkflow` or `StageError::ProjectExists`.
    #[tracing::instrument(skip(self))]
    pub fn create_project_with_id(&self, id: ProjectId, workflow: &str) -> Result<ProjectId> {
        let registry = self.catalog.get(workflow)?;
        let record = ProjectRecord::seed(id, &registry);
        {
            // Creates of the same id are serialized by the slot map
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            self.repository.insert(&record)?;
            slots.entry(record.id.clone()).or_default();
        }
        tracing::info!(project = %record.id, workflow, stages = registry.len(), "project created");
        Ok(record.id)
    }

    /// Applies a partial update (status, progress, assignees, notes).
    ///
    /// A status in the patch goes through the same validation and cascade as
    /// [`StageTracker::request_stage_transition`].
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `StageError::ProjectNotFound` / `StageError::StageNotFound`
    /// - `StageError::Precondition` if a dependency is not terminal
    /// - `StageError::InvalidTransition` in strict lifecycle mode
    /// - `StageError::InvalidProgress` for progress violations
    /// - storage errors from the repository
    #[tracing::instrument(skip(self, patch), fields(status = ?patch.status, progress = ?patch.progress))]
    pub fn update_stage(
        &self,
        project_id: &ProjectId,
        stage_id: &str,
        patch: StagePatch,
        actor: &str,
    ) -> Result<TransitionOutcome> {
        let proposed = patch.status;
        self.with_project(project_id, |_| {
            match self.apply_locked(project_id, stage_id, patch, actor) {
                Ok((outcome, events)) => (Ok(outcome), events),
                Err(e) => {
                    let rejected =
                        matches!(e.kind(), ErrorKind::Precondition | ErrorKind::InvalidInput);
                    let mut events = Vec::new();
                    if let Some(proposed_status) = proposed
                        && rejected
                    {
                        tracing::warn!(
                            project = %project_id,
                            stage = stage_id,
                            proposed = %proposed_status,
                            reason = %e,
                            "transition rejected"
                        );
                        events.push(StageEvent::TransitionRejected {
                            project_id: project_id.to_string(),
                            stage_id: stage_id.to_string(),
                            proposed_status,
                            reason: e.to_string(),
                            actor: actor.to_string(),
                        });
                    }
                    (Err(e), events)
                }
            }
        })
    }

    fn apply_locked(
        &self,
        project_id: &ProjectId,
        stage_id: &str,
        patch: StagePatch,
        actor: &str,
    ) -> Result<(TransitionOutcome, Vec<StageEvent>)> {
        let mut record = self.repository.load(project_id)?;
        let registry = self.catalog.get(&record.workflow)?;
        let mut store = StageStore::from_records(&registry, std::mem::take(&mut record.stages))?;

        let current = store.get(stage_id)?.clone();
        validator::validate_patch(&registry, &store, stage_id, &patch, self.policy)?;

        if is_noop(&current, &patch) {
            tracing::debug!(project = %project_id, stage = stage_id, "update is a no-op");
            return Ok((
                TransitionOutcome {
                    previous_status: current.status,
                    instance: current,
                    changed: false,
                    auto_advanced: Vec::new(),
                },
                Vec::new(),
            ));
        }

        let previous_status = current.status;
        let instance = store.update(stage_id, patch)?;
        let mut events = Vec::new();
        let mut auto_advanced = Vec::new();

        if instance.status != previous_status {
            tracing::info!(
                project = %project_id,
                stage = stage_id,
                from = %previous_status,
                to = %instance.status,
                actor,
                "stage transition"
            );
            events.push(StageEvent::StageUpdated {
                project_id: project_id.to_string(),
                stage_id: stage_id.to_string(),
                previous_status,
                new_status: instance.status,
                actor: actor.to_string(),
            });

            if instance.status.is_terminal() {
                if registry.stage(stage_id)?.approval_required {
                    events.push(StageEvent::ApprovalRequired {
                        project_id: project_id.to_string(),
                        stage_id: stage_id.to_string(),
                    });
                }
                auto_advanced = cascade::on_stage_completed(&registry, &mut store, stage_id)?;
                events.extend(auto_advanced.iter().map(|id| StageEvent::StageAutoAdvanced {
                    project_id: project_id.to_string(),
                    stage_id: id.clone(),
                    triggered_by: stage_id.to_string(),
                }));
            }
        }

        record.stages = store.into_records();
        record.updated_at = Utc::now();
        self.repository.save(&record)?;

        Ok((
            TransitionOutcome {
                instance,
                previous_status,
                changed: true,
                auto_advanced,
            },
            events,
        ))
    }

    /// Deletes a project and its stage instances.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` if the project does not exist.
    #[tracing::instrument(skip(self))]
    pub fn delete_project(&self, project_id: &ProjectId) -> Result<()> {
        self.with_project(project_id, |slot| {
            let result = self.repository.delete(project_id);
            if !self.repository.exists(project_id) {
                slot.retired.store(true, Ordering::Release);
                self.slots
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(project_id);
            }
            (result, Vec::new())
        })?;
        tracing::info!(project = %project_id, "project deleted");
        Ok(())
    }

    /// Lists stored projects, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the repository.
    pub fn list_projects(&self) -> Result<Vec<ProjectId>> {
        self.repository.list()
    }

    /// Loads the full persisted record of a project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` or storage errors.
    pub fn project_record(&self, project_id: &ProjectId) -> Result<ProjectRecord> {
        self.repository.load(project_id)
    }

    /// Registry of the workflow a project was created from.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound`, or `StageError::UnknownWorkflow`
    /// if the workflow is no longer configured.
    pub fn project_registry(&self, project_id: &ProjectId) -> Result<Arc<StageRegistry>> {
        let record = self.repository.load(project_id)?;
        self.catalog.get(&record.workflow)
    }

    /// Computes the progress summary of a project.
    ///
    /// # Errors
    ///
    /// Returns `StageError::ProjectNotFound` or storage errors.
    #[tracing::instrument(skip(self))]
    pub fn project_summary(&self, project_id: &ProjectId) -> Result<ProjectSummary> {
        let (registry, store) = self.load_store(project_id)?;
        Ok(ProjectSummary::compute(project_id, &registry, &store))
    }

    fn load_store(&self, project_id: &ProjectId) -> Result<(Arc<StageRegistry>, StageStore)> {
        let record = self.repository.load(project_id)?;
        let registry = self.catalog.get(&record.workflow)?;
        let store = StageStore::from_records(&registry, record.stages)?;
        Ok((registry, store))
    }

    /// Runs `f` under the project's state lock, then delivers the events it
    /// returned.
    ///
    /// Events are queued before the state lock is released, so they leave in
    /// commit order. Whichever caller finds the outbox idle delivers the
    /// whole queue; a caller that finds it busy (another thread, or a
    /// subscriber calling back in) returns and leaves its events to the
    /// active deliverer.
    fn with_project<T>(
        &self,
        project_id: &ProjectId,
        f: impl FnOnce(&ProjectSlot) -> (Result<T>, Vec<StageEvent>),
    ) -> Result<T> {
        loop {
            let slot = self.slot(project_id)?;
            let guard = slot.state.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.retired.load(Ordering::Acquire) {
                continue;
            }

            let (result, events) = f(slot.as_ref());
            if !events.is_empty() {
                slot.outbox
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pending
                    .extend(events);
            }
            drop(guard);

            self.deliver(&slot);
            return result;
        }
    }

    fn deliver(&self, slot: &ProjectSlot) {
        {
            let mut outbox = slot.outbox.lock().unwrap_or_else(PoisonError::into_inner);
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }

        loop {
            let batch: Vec<StageEvent> = {
                let mut outbox = slot.outbox.lock().unwrap_or_else(PoisonError::into_inner);
                if outbox.pending.is_empty() {
                    outbox.delivering = false;
                    return;
                }
                outbox.pending.drain(..).collect()
            };
            for event in &batch {
                self.publisher.emit(event);
            }
        }
    }

    /// Slot of an existing project. Unknown ids never get a slot.
    fn slot(&self, project_id: &ProjectId) -> Result<Arc<ProjectSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get(project_id) {
            return Ok(Arc::clone(slot));
        }
        if !self.repository.exists(project_id) {
            return Err(StageError::ProjectNotFound(project_id.to_string()));
        }
        Ok(Arc::clone(slots.entry(project_id.clone()).or_default()))
    }
}

impl StageTracker for ProjectCoordinator {
    #[tracing::instrument(skip(self))]
    fn create_project(&self, workflow: &str) -> Result<ProjectId> {
        self.create_project_with_id(ProjectId::generate(), workflow)
    }

    fn request_stage_transition(
        &self,
        project_id: &ProjectId,
        stage_id: &str,
        new_status: StageStatus,
        actor: &str,
    ) -> Result<TransitionOutcome> {
        self.update_stage(project_id, stage_id, StagePatch::status(new_status), actor)
    }

    #[tracing::instrument(skip(self))]
    fn get_project_stage_snapshot(&self, project_id: &ProjectId) -> Result<Vec<StageInstance>> {
        let (_, store) = self.load_store(project_id)?;
        Ok(store.snapshot())
    }
}

impl fmt::Debug for ProjectCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectCoordinator")
            .field("workflows", &self.catalog.names())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn is_noop(current: &StageInstance, patch: &StagePatch) -> bool {
    patch.status.is_none_or(|s| s == current.status)
        && patch.progress.is_none_or(|p| p == current.progress)
        && patch
            .assigned_parties
            .as_ref()
            .is_none_or(|parties| *parties == current.assigned_parties)
        && patch.notes.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, EventKind};
    use crate::registry::StageDefinition;
    use crate::repository::memory::MemoryRepository;

    fn coordinator() -> (ProjectCoordinator, Arc<EventBus>, Arc<Mutex<Vec<StageEvent>>>) {
        let mut catalog = WorkflowCatalog::empty();
        catalog
            .register(
                "abc",
                "",
                vec![
                    StageDefinition::new("a", "A", 1),
                    StageDefinition::new("b", "B", 2).depends_on(["a"]).requires_approval(),
                    StageDefinition::new("c", "C", 3).depends_on(["a", "b"]),
                ],
            )
            .unwrap();

        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let coordinator = ProjectCoordinator::new(
            catalog,
            Arc::new(MemoryRepository::new()),
            Arc::clone(&bus) as Arc<dyn Publisher>,
        );
        (coordinator, bus, seen)
    }

    fn kinds(seen: &Mutex<Vec<StageEvent>>) -> Vec<EventKind> {
        seen.lock().unwrap().iter().map(StageEvent::kind).collect()
    }

    #[test]
    fn test_create_project_seeds_not_started() {
        let (coord, _, _) = coordinator();
        let id = coord.create_project("abc").unwrap();
        let snapshot = coord.get_project_stage_snapshot(&id).unwrap();
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().all(|s| s.status == StageStatus::NotStarted && s.progress == 0));
    }

    #[test]
    fn test_create_unknown_workflow() {
        let (coord, _, _) = coordinator();
        assert!(matches!(
            coord.create_project("nope"),
            Err(StageError::UnknownWorkflow(_))
        ));
    }

    #[test]
    fn test_terminal_transition_emits_in_order() {
        let (coord, _, seen) = coordinator();
        let id = coord.create_project("abc").unwrap();

        coord
            .request_stage_transition(&id, "a", StageStatus::Approved, "alice")
            .unwrap();
        assert_eq!(
            kinds(&seen),
            vec![EventKind::StageUpdated, EventKind::StageAutoAdvanced]
        );

        seen.lock().unwrap().clear();
        let outcome = coord
            .request_stage_transition(&id, "b", StageStatus::Approved, "alice")
            .unwrap();
        assert_eq!(outcome.auto_advanced, vec!["c".to_string()]);
        assert_eq!(
            kinds(&seen),
            vec![
                EventKind::StageUpdated,
                EventKind::ApprovalRequired,
                EventKind::StageAutoAdvanced
            ]
        );
    }

    #[test]
    fn test_rejection_publishes_event_and_keeps_status() {
        let (coord, _, seen) = coordinator();
        let id = coord.create_project("abc").unwrap();

        let err = coord
            .request_stage_transition(&id, "c", StageStatus::Completed, "bob")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Precondition);

        let events = seen.lock().unwrap().clone();
        match events.as_slice() {
            [StageEvent::TransitionRejected { stage_id, reason, .. }] => {
                assert_eq!(stage_id, "c");
                assert!(reason.contains("'a'"));
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let snapshot = coord.get_project_stage_snapshot(&id).unwrap();
        assert_eq!(snapshot[2].status, StageStatus::NotStarted);
    }

    #[test]
    fn test_unknown_stage_is_not_found_without_event() {
        let (coord, _, seen) = coordinator();
        let id = coord.create_project("abc").unwrap();
        let err = coord
            .request_stage_transition(&id, "zz", StageStatus::InProgress, "bob")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_update_stage_fields() {
        let (coord, _, seen) = coordinator();
        let id = coord.create_project("abc").unwrap();

        let patch = StagePatch::default()
            .with_progress(40)
            .with_assigned_parties(vec!["eng-1".to_string()])
            .with_note(crate::store::Note::new("alice", "survey booked"));
        let outcome = coord.update_stage(&id, "a", patch, "alice").unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.instance.progress, 40);
        assert_eq!(outcome.instance.notes.len(), 1);
        // No status change, no event
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_strict_policy() {
        let (coord, _, _) = coordinator();
        let coord = coord.with_policy(TransitionPolicy {
            strict_lifecycle: true,
        });
        let id = coord.create_project("abc").unwrap();
        assert!(matches!(
            coord.request_stage_transition(&id, "a", StageStatus::Approved, "x"),
            Err(StageError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_delete_project() {
        let (coord, _, _) = coordinator();
        let id = coord.create_project("abc").unwrap();
        assert_eq!(coord.list_projects().unwrap(), vec![id.clone()]);

        coord.delete_project(&id).unwrap();
        assert!(coord.list_projects().unwrap().is_empty());
        assert!(matches!(
            coord.get_project_stage_snapshot(&id),
            Err(StageError::ProjectNotFound(_))
        ));
    }

    fn lock_entries(coord: &ProjectCoordinator) -> usize {
        coord.slots.lock().unwrap().len()
    }

    #[test]
    fn test_unknown_ids_leave_no_lock_entries() {
        let (coord, _, seen) = coordinator();

        for n in 0..100 {
            let ghost = ProjectId::parse(format!("ghost-{n}")).unwrap();
            assert!(matches!(
                coord.request_stage_transition(&ghost, "a", StageStatus::Approved, "x"),
                Err(StageError::ProjectNotFound(_))
            ));
            assert!(matches!(
                coord.delete_project(&ghost),
                Err(StageError::ProjectNotFound(_))
            ));
        }

        assert_eq!(lock_entries(&coord), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_delete_releases_lock_entry_and_id_can_be_reused() {
        let (coord, _, _) = coordinator();
        let id = ProjectId::parse("site-7").unwrap();

        coord.create_project_with_id(id.clone(), "abc").unwrap();
        coord
            .request_stage_transition(&id, "a", StageStatus::Approved, "x")
            .unwrap();
        assert_eq!(lock_entries(&coord), 1);

        coord.delete_project(&id).unwrap();
        assert_eq!(lock_entries(&coord), 0);

        coord.create_project_with_id(id.clone(), "abc").unwrap();
        let snapshot = coord.get_project_stage_snapshot(&id).unwrap();
        assert!(snapshot.iter().all(|s| s.status == StageStatus::NotStarted));
    }

    #[test]
    fn test_concurrent_creates_with_same_id() {
        let (coord, _, _) = coordinator();
        let id = ProjectId::parse("contested").unwrap();

        let created = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| coord.create_project_with_id(id.clone(), "abc")))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|r| r.is_ok())
                .count()
        });

        assert_eq!(created, 1);
        assert_eq!(lock_entries(&coord), 1);
    }

    #[test]
    fn test_events_follow_commit_order_across_threads() {
        let (coord, bus, _) = coordinator();

        // Rebuild each project's stage statuses from events alone
        let mirror: Arc<Mutex<HashMap<(String, String), StageStatus>>> = Arc::default();
        let sink = Arc::clone(&mirror);
        bus.subscribe_all(move |event| {
            let status = match event {
                StageEvent::StageUpdated { new_status, .. } => *new_status,
                StageEvent::StageAutoAdvanced { .. } => StageStatus::InProgress,
                _ => return Ok(()),
            };
            sink.lock().unwrap().insert(
                (event.project_id().to_string(), event.stage_id().to_string()),
                status,
            );
            Ok(())
        });

        let projects: Vec<ProjectId> = (0..20)
            .map(|_| coord.create_project("abc").unwrap())
            .collect();

        std::thread::scope(|scope| {
            for id in &projects {
                let coord = &coord;
                scope.spawn(move || {
                    coord
                        .request_stage_transition(id, "a", StageStatus::Approved, "pm")
                        .unwrap();
                });
                scope.spawn(move || {
                    while coord
                        .request_stage_transition(id, "b", StageStatus::Approved, "client")
                        .is_err()
                    {
                        std::thread::yield_now();
                    }
                });
            }
        });

        let mirror = mirror.lock().unwrap();
        for id in &projects {
            for instance in coord.get_project_stage_snapshot(id).unwrap() {
                let key = (id.to_string(), instance.stage_id.clone());
                assert_eq!(
                    mirror.get(&key).copied().unwrap_or(StageStatus::NotStarted),
                    instance.status,
                    "event-built view of {key:?} diverged from the store"
                );
            }
        }
    }

    #[test]
    fn test_subscriber_can_update_the_same_project() {
        let (coord, bus, seen) = coordinator();
        let coord = Arc::new(coord);
        let id = coord.create_project("abc").unwrap();

        let weak = Arc::downgrade(&coord);
        let target = id.clone();
        bus.subscribe(EventKind::StageAutoAdvanced, move |event| {
            if event.stage_id() == "b"
                && let Some(coord) = weak.upgrade()
            {
                coord.request_stage_transition(&target, "b", StageStatus::InReview, "bot")?;
            }
            Ok(())
        });

        coord
            .request_stage_transition(&id, "a", StageStatus::Approved, "pm")
            .unwrap();

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events.iter().map(StageEvent::kind).collect::<Vec<_>>(),
            vec![
                EventKind::StageUpdated,
                EventKind::StageAutoAdvanced,
                EventKind::StageUpdated
            ]
        );
        assert!(matches!(
            &events[2],
            StageEvent::StageUpdated { stage_id, new_status: StageStatus::InReview, .. }
                if stage_id == "b"
        ));
    }
}
