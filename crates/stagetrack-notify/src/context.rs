//! Context structures for notification templates.

use serde::Serialize;
use stagetrack_core::{StageEvent, StageRegistry};

/// Flat view of a [`StageEvent`] handed to templates.
///
/// Fields that do not apply to the event kind are `None`.
///
/// # Examples
///
/// ```
/// use stagetrack_notify::NotificationContext;
/// use stagetrack_core::StageEvent;
///
/// let event = StageEvent::ApprovalRequired {
///     project_id: "p-1".into(),
///     stage_id: "concept".into(),
/// };
/// let ctx = NotificationContext::from_event(&event).with_stage_name("Concept Design");
/// assert_eq!(ctx.event_type, "approval_required");
/// assert_eq!(ctx.stage_name, "Concept Design");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContext {
    /// Event kind name, also the template name.
    pub event_type: String,
    /// Owning project.
    pub project_id: String,
    /// Stage id.
    pub stage_id: String,
    /// Display name of the stage; the id when unknown.
    pub stage_name: String,
    /// Status before a `stage_updated`.
    pub previous_status: Option<String>,
    /// Status after a `stage_updated`.
    pub new_status: Option<String>,
    /// Requested status of a `transition_rejected`.
    pub proposed_status: Option<String>,
    /// Who requested the change.
    pub actor: Option<String>,
    /// Stage whose completion caused a `stage_auto_advanced`.
    pub triggered_by: Option<String>,
    /// Rejection reason.
    pub reason: Option<String>,
}

impl NotificationContext {
    /// Builds the context of `event`.
    #[must_use]
    pub fn from_event(event: &StageEvent) -> Self {
        let mut ctx = Self {
            event_type: event.kind().as_str().to_string(),
            project_id: event.project_id().to_string(),
            stage_id: event.stage_id().to_string(),
            stage_name: event.stage_id().to_string(),
            previous_status: None,
            new_status: None,
            proposed_status: None,
            actor: None,
            triggered_by: None,
            reason: None,
        };

        match event {
            StageEvent::StageUpdated {
                previous_status,
                new_status,
                actor,
                ..
            } => {
                ctx.previous_status = Some(previous_status.to_string());
                ctx.new_status = Some(new_status.to_string());
                ctx.actor = Some(actor.clone());
            }
            StageEvent::StageAutoAdvanced { triggered_by, .. } => {
                ctx.triggered_by = Some(triggered_by.clone());
            }
            StageEvent::TransitionRejected {
                proposed_status,
                reason,
                actor,
                ..
            } => {
                ctx.proposed_status = Some(proposed_status.to_string());
                ctx.reason = Some(reason.clone());
                ctx.actor = Some(actor.clone());
            }
            StageEvent::ApprovalRequired { .. } => {}
        }

        ctx
    }

    /// Sets the display name of the stage.
    #[must_use]
    pub fn with_stage_name(mut self, name: impl Into<String>) -> Self {
        self.stage_name = name.into();
        self
    }

    /// Resolves the stage display name from `registry`, keeping the id if the
    /// stage is not defined there.
    #[must_use]
    pub fn with_registry(self, registry: &StageRegistry) -> Self {
        match registry.get(&self.stage_id) {
            Some(stage) => {
                let name = stage.name.clone();
                self.with_stage_name(name)
            }
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagetrack_core::{StageDefinition, StageStatus};

    #[test]
    fn test_updated_fields() {
        let event = StageEvent::StageUpdated {
            project_id: "p".into(),
            stage_id: "survey".into(),
            previous_status: StageStatus::InProgress,
            new_status: StageStatus::InReview,
            actor: "surveyor".into(),
        };
        let ctx = NotificationContext::from_event(&event);
        assert_eq!(ctx.previous_status.as_deref(), Some("in_progress"));
        assert_eq!(ctx.new_status.as_deref(), Some("in_review"));
        assert_eq!(ctx.actor.as_deref(), Some("surveyor"));
        assert!(ctx.reason.is_none());
    }

    #[test]
    fn test_registry_name_lookup() {
        let registry = StageRegistry::define(
            "one",
            vec![StageDefinition::new("survey", "Survey & Valuation", 1)],
        )
        .unwrap();

        let known = StageEvent::ApprovalRequired {
            project_id: "p".into(),
            stage_id: "survey".into(),
        };
        let unknown = StageEvent::ApprovalRequired {
            project_id: "p".into(),
            stage_id: "other".into(),
        };

        assert_eq!(
            NotificationContext::from_event(&known)
                .with_registry(&registry)
                .stage_name,
            "Survey & Valuation"
        );
        assert_eq!(
            NotificationContext::from_event(&unknown)
                .with_registry(&registry)
                .stage_name,
            "other"
        );
    }
}
