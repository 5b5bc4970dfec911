//! Transition validation.
//!
//! Every change to a stage instance is checked here before it reaches the
//! store. The only hard rule is the dependency gate on terminal statuses;
//! lifecycle enforcement is opt-in through [`TransitionPolicy`].

use crate::error::{Result, StageError};
use crate::registry::StageRegistry;
use crate::status::StageStatus;
use crate::store::{StagePatch, StageStore};

/// Knobs controlling how strictly transitions are checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Reject moves outside the modeled lifecycle (see [`StageStatus`]).
    pub strict_lifecycle: bool,
}

/// Checks that `stage_id` may move to `proposed`.
///
/// Terminal statuses require every dependency to be terminal; dependencies
/// are checked in declaration order and the first unmet one is reported.
/// Non-terminal statuses and re-entering the current status always pass.
///
/// # Errors
///
/// Returns:
/// - `StageError::StageNotFound` if the stage is unknown
/// - `StageError::Precondition` naming the first non-terminal dependency
pub fn validate_transition(
    registry: &StageRegistry,
    store: &StageStore,
    stage_id: &str,
    proposed: StageStatus,
) -> Result<()> {
    let stage = registry.stage(stage_id)?;
    let current = store.status_of(stage_id)?;

    if current == proposed || !proposed.is_terminal() {
        return Ok(());
    }

    for dep in &stage.dependencies {
        let dependency_status = store.status_of(dep)?;
        if !dependency_status.is_terminal() {
            return Err(StageError::Precondition {
                stage: stage_id.to_string(),
                proposed,
                unmet_dependency: dep.clone(),
                dependency_status,
            });
        }
    }

    Ok(())
}

/// Checks that the move follows the modeled lifecycle.
///
/// # Errors
///
/// Returns `StageError::InvalidTransition` if `current` cannot reach `proposed`.
pub fn validate_lifecycle(stage_id: &str, current: StageStatus, proposed: StageStatus) -> Result<()> {
    if current.can_transition_to(&proposed) {
        Ok(())
    } else {
        Err(StageError::InvalidTransition {
            stage: stage_id.to_string(),
            from: current,
            to: proposed,
        })
    }
}

/// Validates a full patch: status gate, optional lifecycle check and
/// progress rules.
///
/// Progress rules:
/// - values above 100 are rejected
/// - 100 is only allowed together with a terminal status
/// - progress may not go down unless the same patch changes the status
///
/// # Errors
///
/// Returns the errors of [`validate_transition`] and [`validate_lifecycle`],
/// and `StageError::InvalidProgress` for progress violations.
pub fn validate_patch(
    registry: &StageRegistry,
    store: &StageStore,
    stage_id: &str,
    patch: &StagePatch,
    policy: TransitionPolicy,
) -> Result<()> {
    let current = store.get(stage_id)?;

    if let Some(proposed) = patch.status {
        if policy.strict_lifecycle {
            validate_lifecycle(stage_id, current.status, proposed)?;
        }
        validate_transition(registry, store, stage_id, proposed)?;
    }

    let resulting_status = patch.status.unwrap_or(current.status);
    let resulting_progress = patch.progress.unwrap_or(current.progress);

    if let Some(progress) = patch.progress {
        if progress > 100 {
            return Err(invalid_progress(stage_id, format!("{progress} exceeds 100")));
        }
        let status_changes = resulting_status != current.status;
        if progress < current.progress && !status_changes {
            return Err(invalid_progress(
                stage_id,
                format!("cannot lower progress from {} to {progress}", current.progress),
            ));
        }
    }

    if resulting_progress == 100 && !resulting_status.is_terminal() {
        return Err(invalid_progress(
            stage_id,
            format!("100% requires a terminal status, stage would be {resulting_status}"),
        ));
    }

    Ok(())
}

fn invalid_progress(stage_id: &str, reason: String) -> StageError {
    StageError::InvalidProgress {
        stage: stage_id.to_string(),
        reason,
    }
}
