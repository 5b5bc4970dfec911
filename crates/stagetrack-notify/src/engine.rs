//! Notification renderer trait definition.

use crate::context::NotificationContext;
use crate::error::Result;
use serde::Serialize;
use stagetrack_core::StageEvent;

/// Trait for turning stage events into human-readable messages.
///
/// Templates are looked up by name; the built-in names are the event kind
/// names (`stage_updated`, `stage_auto_advanced`, `transition_rejected`,
/// `approval_required`).
pub trait NotificationRenderer {
    /// Renders a template with the provided context.
    ///
    /// # Errors
    ///
    /// Returns an error if the template does not exist or rendering fails.
    fn render<T: Serialize>(&self, template: &str, ctx: &T) -> Result<String>;

    /// Renders the template matching the kind of the context's event.
    ///
    /// # Errors
    ///
    /// See [`NotificationRenderer::render`].
    fn render_context(&self, ctx: &NotificationContext) -> Result<String> {
        self.render(&ctx.event_type, ctx)
    }

    /// Renders `event` with its default context.
    ///
    /// # Errors
    ///
    /// See [`NotificationRenderer::render`].
    fn render_event(&self, event: &StageEvent) -> Result<String> {
        self.render_context(&NotificationContext::from_event(event))
    }

    /// Lists the available template names, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the template source cannot be listed.
    fn list_templates(&self) -> Result<Vec<String>>;
}
