//! Integration tests for the transition path.
//!
//! Drives the coordinator end to end: validation, cascade, events and
//! per-project serialization.

use stagetrack_core::repository::memory::MemoryRepository;
use stagetrack_core::{
    EventBus, EventKind, Note, ProjectCoordinator, Publisher, StageDefinition, StageError,
    StageEvent, StagePatch, StageStatus, StageTracker, WorkflowCatalog,
};
use std::sync::{Arc, Mutex};

struct Harness {
    coordinator: ProjectCoordinator,
    events: Arc<Mutex<Vec<StageEvent>>>,
}

impl Harness {
    fn new(catalog: WorkflowCatalog) -> Self {
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        bus.subscribe_all(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });

        let coordinator = ProjectCoordinator::new(
            catalog,
            Arc::new(MemoryRepository::new()),
            bus as Arc<dyn Publisher>,
        );
        Self {
            coordinator,
            events,
        }
    }

    fn abc() -> Self {
        let mut catalog = WorkflowCatalog::empty();
        catalog
            .register(
                "abc",
                "three stages",
                vec![
                    StageDefinition::new("a", "A", 1),
                    StageDefinition::new("b", "B", 2).depends_on(["a"]),
                    StageDefinition::new("c", "C", 3).depends_on(["a", "b"]),
                ],
            )
            .unwrap();
        Self::new(catalog)
    }

    fn take_events(&self) -> Vec<StageEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

fn status_map(coord: &ProjectCoordinator, id: &stagetrack_core::ProjectId) -> Vec<(String, StageStatus)> {
    coord
        .get_project_stage_snapshot(id)
        .unwrap()
        .into_iter()
        .map(|s| (s.stage_id, s.status))
        .collect()
}

#[test]
fn test_abc_scenario() {
    let h = Harness::abc();
    let coord = &h.coordinator;
    let id = coord.create_project("abc").unwrap();

    coord
        .request_stage_transition(&id, "a", StageStatus::Approved, "pm")
        .unwrap();
    assert_eq!(
        status_map(coord, &id),
        vec![
            ("a".to_string(), StageStatus::Approved),
            ("b".to_string(), StageStatus::InProgress),
            ("c".to_string(), StageStatus::NotStarted),
        ]
    );

    coord
        .request_stage_transition(&id, "b", StageStatus::Approved, "pm")
        .unwrap();
    assert_eq!(status_map(coord, &id)[2].1, StageStatus::InProgress);

    // B is deliberately reset, C can no longer be approved
    coord
        .request_stage_transition(&id, "b", StageStatus::Delayed, "pm")
        .unwrap();
    let err = coord
        .request_stage_transition(&id, "c", StageStatus::Approved, "pm")
        .unwrap_err();

    match err {
        StageError::Precondition {
            unmet_dependency,
            dependency_status,
            ..
        } => {
            assert_eq!(unmet_dependency, "b");
            assert_eq!(dependency_status, StageStatus::Delayed);
        }
        other => panic!("expected Precondition, got {other:?}"),
    }
    assert_eq!(status_map(coord, &id)[2].1, StageStatus::InProgress);
}

#[test]
fn test_cascade_is_one_hop_per_completion() {
    let h = Harness::abc();
    let id = h.coordinator.create_project("abc").unwrap();

    let outcome = h
        .coordinator
        .request_stage_transition(&id, "a", StageStatus::Completed, "pm")
        .unwrap();
    assert_eq!(outcome.auto_advanced, vec!["b".to_string()]);

    let advanced: Vec<String> = h
        .take_events()
        .into_iter()
        .filter(|e| e.kind() == EventKind::StageAutoAdvanced)
        .map(|e| e.stage_id().to_string())
        .collect();
    assert_eq!(advanced, vec!["b".to_string()]);
}

#[test]
fn test_repeated_update_publishes_once() {
    let h = Harness::abc();
    let id = h.coordinator.create_project("abc").unwrap();

    let first = h
        .coordinator
        .request_stage_transition(&id, "a", StageStatus::InProgress, "pm")
        .unwrap();
    let second = h
        .coordinator
        .request_stage_transition(&id, "a", StageStatus::InProgress, "pm")
        .unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    let updated = h
        .take_events()
        .into_iter()
        .filter(|e| e.kind() == EventKind::StageUpdated)
        .count();
    assert_eq!(updated, 1);
}

#[test]
fn test_rejected_transition_leaves_state_untouched() {
    let h = Harness::abc();
    let id = h.coordinator.create_project("abc").unwrap();
    let before = h.coordinator.get_project_stage_snapshot(&id).unwrap();

    assert!(
        h.coordinator
            .request_stage_transition(&id, "b", StageStatus::Completed, "pm")
            .is_err()
    );

    assert_eq!(h.coordinator.get_project_stage_snapshot(&id).unwrap(), before);
    let events = h.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::TransitionRejected);
}

#[test]
fn test_failing_subscriber_does_not_fail_transition() {
    let bus = Arc::new(EventBus::new());
    bus.subscribe(EventKind::StageUpdated, |_| anyhow::bail!("smtp unavailable"));

    let coord = ProjectCoordinator::new(
        WorkflowCatalog::builtin().unwrap(),
        Arc::new(MemoryRepository::new()),
        bus as Arc<dyn Publisher>,
    );
    let id = coord.create_project("engineering").unwrap();
    assert!(
        coord
            .request_stage_transition(&id, "survey", StageStatus::InProgress, "eng")
            .is_ok()
    );
}

#[test]
fn test_conveyancing_join() {
    let h = Harness::new(WorkflowCatalog::builtin().unwrap());
    let coord = &h.coordinator;
    let id = coord.create_project("conveyancing").unwrap();

    for stage in ["instruction", "survey", "mortgage", "searches"] {
        coord
            .request_stage_transition(&id, stage, StageStatus::Completed, "solicitor")
            .unwrap();
    }
    // exchange waits for contracts as well
    let exchange = coord
        .get_project_stage_snapshot(&id)
        .unwrap()
        .into_iter()
        .find(|s| s.stage_id == "exchange")
        .unwrap();
    assert_eq!(exchange.status, StageStatus::NotStarted);

    let outcome = coord
        .request_stage_transition(&id, "contracts", StageStatus::Completed, "solicitor")
        .unwrap();
    assert_eq!(outcome.auto_advanced, vec!["exchange".to_string()]);

    let summary = coord.project_summary(&id).unwrap();
    assert_eq!(summary.terminal_stages, 5);
    assert_eq!(summary.completion_percentage, 71);
    assert_eq!(summary.active, vec!["exchange".to_string()]);
    assert_eq!(summary.remaining_critical_days, 22);
}

#[test]
fn test_concurrent_updates_are_not_lost() {
    let h = Harness::abc();
    let coord = &h.coordinator;
    let id = coord.create_project("abc").unwrap();

    std::thread::scope(|scope| {
        for worker in 0..8 {
            let id = &id;
            scope.spawn(move || {
                for n in 0..5 {
                    let patch = StagePatch::default()
                        .with_note(Note::new(format!("worker-{worker}"), format!("note {n}")));
                    coord.update_stage(id, "a", patch, "worker").unwrap();
                }
            });
        }
    });

    let snapshot = coord.get_project_stage_snapshot(&id).unwrap();
    assert_eq!(snapshot[0].notes.len(), 40);
}

#[test]
fn test_concurrent_transitions_cascade_once() {
    let h = Harness::abc();
    let coord = &h.coordinator;
    let id = coord.create_project("abc").unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                coord
                    .request_stage_transition(&id, "a", StageStatus::Approved, "pm")
                    .unwrap();
            });
        }
    });

    let events = h.take_events();
    let updated = events
        .iter()
        .filter(|e| e.kind() == EventKind::StageUpdated)
        .count();
    let advanced = events
        .iter()
        .filter(|e| e.kind() == EventKind::StageAutoAdvanced)
        .count();
    assert_eq!(updated, 1);
    assert_eq!(advanced, 1);
}
