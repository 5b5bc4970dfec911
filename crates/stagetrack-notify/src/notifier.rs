//! Event bus subscriber that renders events into messages.

use crate::context::NotificationContext;
use crate::engine::NotificationRenderer;
use crate::error::Result;
use crate::manager::NotificationManager;
use stagetrack_core::{EventBus, StageEvent, StageRegistry, SubscriptionId};
use std::sync::Arc;

/// Renders stage events and hands the messages to a delivery callback.
#[derive(Debug)]
pub struct Notifier {
    manager: NotificationManager,
    registry: Option<Arc<StageRegistry>>,
}

impl Notifier {
    /// Creates a notifier using `manager` for rendering.
    pub fn new(manager: NotificationManager) -> Self {
        Self {
            manager,
            registry: None,
        }
    }

    /// Resolves stage display names from `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<StageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Renders the message for `event`.
    ///
    /// # Errors
    ///
    /// Returns template lookup or rendering errors.
    pub fn message_for(&self, event: &StageEvent) -> Result<String> {
        let mut ctx = NotificationContext::from_event(event);
        if let Some(registry) = &self.registry {
            ctx = ctx.with_registry(registry);
        }
        self.manager.render_context(&ctx)
    }

    /// Subscribes to every event on `bus`. Each event is rendered and passed
    /// to `deliver`; render and delivery failures are reported to the bus,
    /// which logs them.
    pub fn attach<F>(self: Arc<Self>, bus: &EventBus, deliver: F) -> SubscriptionId
    where
        F: Fn(&StageEvent, String) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        bus.subscribe_all(move |event| {
            let message = self.message_for(event)?;
            deliver(event, message)
        })
    }
}
