//! Stage transition events and their synchronous delivery.
//!
//! The coordinator only sees the [`Publisher`] capability. [`EventBus`] is the
//! in-process implementation: handlers run synchronously, in subscription
//! order, and a failing handler never stops the others or the caller.

use crate::status::StageStatus;
use serde::Serialize;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Kind of a [`StageEvent`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A stage's status changed through an explicit request.
    StageUpdated,
    /// A stage was started by the cascade.
    StageAutoAdvanced,
    /// A requested transition was refused.
    TransitionRejected,
    /// A stage that needs external approval reached a terminal status.
    ApprovalRequired,
}

impl EventKind {
    /// All kinds.
    pub const ALL: [EventKind; 4] = [
        EventKind::StageUpdated,
        EventKind::StageAutoAdvanced,
        EventKind::TransitionRejected,
        EventKind::ApprovalRequired,
    ];

    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StageUpdated => "stage_updated",
            EventKind::StageAutoAdvanced => "stage_auto_advanced",
            EventKind::TransitionRejected => "transition_rejected",
            EventKind::ApprovalRequired => "approval_required",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event published by the coordinator.
///
/// Each event carries enough data for a subscriber to render a dashboard
/// update or send a notification without querying the tracker again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageEvent {
    /// A stage's status changed.
    StageUpdated {
        /// Owning project.
        project_id: String,
        /// Stage that changed.
        stage_id: String,
        /// Status before the change.
        previous_status: StageStatus,
        /// Status after the change.
        new_status: StageStatus,
        /// Who requested the change.
        actor: String,
    },

    /// A stage was moved to `in_progress` by the cascade.
    StageAutoAdvanced {
        /// Owning project.
        project_id: String,
        /// Stage that was started.
        stage_id: String,
        /// Stage whose completion triggered the cascade.
        triggered_by: String,
    },

    /// A transition request was refused.
    TransitionRejected {
        /// Owning project.
        project_id: String,
        /// Stage the request targeted.
        stage_id: String,
        /// Status that was requested.
        proposed_status: StageStatus,
        /// Human-readable reason, naming the unmet dependency if any.
        reason: String,
        /// Who requested the change.
        actor: String,
    },

    /// A stage flagged for external approval reached a terminal status.
    ApprovalRequired {
        /// Owning project.
        project_id: String,
        /// Stage awaiting approval.
        stage_id: String,
    },
}

impl StageEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            StageEvent::StageUpdated { .. } => EventKind::StageUpdated,
            StageEvent::StageAutoAdvanced { .. } => EventKind::StageAutoAdvanced,
            StageEvent::TransitionRejected { .. } => EventKind::TransitionRejected,
            StageEvent::ApprovalRequired { .. } => EventKind::ApprovalRequired,
        }
    }

    /// Project the event belongs to.
    pub fn project_id(&self) -> &str {
        match self {
            StageEvent::StageUpdated { project_id, .. }
            | StageEvent::StageAutoAdvanced { project_id, .. }
            | StageEvent::TransitionRejected { project_id, .. }
            | StageEvent::ApprovalRequired { project_id, .. } => project_id,
        }
    }

    /// Stage the event is about.
    pub fn stage_id(&self) -> &str {
        match self {
            StageEvent::StageUpdated { stage_id, .. }
            | StageEvent::StageAutoAdvanced { stage_id, .. }
            | StageEvent::TransitionRejected { stage_id, .. }
            | StageEvent::ApprovalRequired { stage_id, .. } => stage_id,
        }
    }
}

/// Capability to publish events, held by the coordinator.
pub trait Publisher: Send + Sync {
    /// Delivers `event` to interested parties. Must not fail.
    fn emit(&self, event: &StageEvent);
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of one [`EventBus::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

type Handler = Arc<dyn Fn(&StageEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    handler: Handler,
}

/// Synchronous in-process event bus.
///
/// # Examples
///
/// ```
/// use stagetrack_core::{EventBus, EventKind, StageEvent};
///
/// let bus = EventBus::new();
/// bus.subscribe(EventKind::StageAutoAdvanced, |event| {
///     println!("{} started", event.stage_id());
///     Ok(())
/// });
///
/// let report = bus.publish(&StageEvent::StageAutoAdvanced {
///     project_id: "p-1".into(),
///     stage_id: "searches".into(),
///     triggered_by: "instruction".into(),
/// });
/// assert_eq!(report.delivered, 1);
/// ```
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `handler` to events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&StageEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(Some(kind), Arc::new(handler))
    }

    /// Subscribes `handler` to every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StageEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add(None, Arc::new(handler))
    }

    fn add(&self, kind: Option<EventKind>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, kind, handler });
        id
    }

    /// Removes a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to matching handlers in subscription order.
    ///
    /// Handlers run outside the subscription lock, so a handler may
    /// subscribe or unsubscribe without deadlocking. Errors and panics are
    /// logged per handler and counted in the report.
    pub fn publish(&self, event: &StageEvent) -> DeliveryReport {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind.is_none_or(|k| k == kind))
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect();

        let mut report = DeliveryReport::default();
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| (*handler)(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::warn!(
                        subscription = id.0,
                        event = %kind,
                        error = %format!("{e:#}"),
                        "event handler failed"
                    );
                }
                Err(_) => {
                    report.failed += 1;
                    tracing::warn!(subscription = id.0, event = %kind, "event handler panicked");
                }
            }
        }

        report
    }
}

impl Publisher for EventBus {
    fn emit(&self, event: &StageEvent) {
        self.publish(event);
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
