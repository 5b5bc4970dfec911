//! Automatic start of dependents after a stage completes.

use crate::error::Result;
use crate::registry::StageRegistry;
use crate::status::StageStatus;
use crate::store::{StagePatch, StageStore};

/// Advances the direct dependents of `completed_stage_id` that are ready.
///
/// A dependent is advanced from `NotStarted` to `InProgress` when every one
/// of its dependencies is terminal. Only one hop is taken: dependents of the
/// advanced stages are left alone until those stages themselves complete.
/// Stages in any other status, including `Delayed` and `Blocked`, are never
/// touched, and nothing is ever advanced to a terminal status.
///
/// Returns the ids of the advanced stages in registry order.
///
/// # Errors
///
/// Returns `StageError::StageNotFound` if the store is missing a stage the
/// registry defines.
pub fn on_stage_completed(
    registry: &StageRegistry,
    store: &mut StageStore,
    completed_stage_id: &str,
) -> Result<Vec<String>> {
    let mut advanced = Vec::new();

    for dependent_id in registry.dependents(completed_stage_id) {
        if store.status_of(dependent_id)? != StageStatus::NotStarted {
            continue;
        }

        let dependent = registry.stage(dependent_id)?;
        let mut ready = true;
        for dep in &dependent.dependencies {
            if !store.status_of(dep)?.is_terminal() {
                ready = false;
                break;
            }
        }

        if ready {
            store.update(dependent_id, StagePatch::status(StageStatus::InProgress))?;
            tracing::debug!(
                stage = %dependent_id,
                trigger = %completed_stage_id,
                "stage auto-advanced"
            );
            advanced.push(dependent_id.clone());
        }
    }

    Ok(advanced)
}
