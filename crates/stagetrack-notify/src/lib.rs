//! Notification rendering for stagetrack events.
//!
//! This crate turns [`stagetrack_core::StageEvent`]s into human-readable
//! messages using minijinja templates. Every event kind has a built-in
//! template; users can override them from a directory of `.j2` files
//! (by default `.stagetrack/templates`).
//!
//! # Examples
//!
//! ```
//! use stagetrack_core::{EventBus, StageEvent};
//! use stagetrack_notify::{NotificationManager, Notifier};
//! use std::sync::Arc;
//!
//! let bus = EventBus::new();
//! let notifier = Arc::new(Notifier::new(NotificationManager::new()?));
//! notifier.attach(&bus, |_, message| {
//!     println!("{message}");
//!     Ok(())
//! });
//!
//! bus.publish(&StageEvent::StageAutoAdvanced {
//!     project_id: "p-1".into(),
//!     stage_id: "searches".into(),
//!     triggered_by: "instruction".into(),
//! });
//! # Ok::<(), stagetrack_notify::NotifyError>(())
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod manager;
pub mod notifier;

// Re-export public types for convenience
pub use context::NotificationContext;
pub use engine::NotificationRenderer;
pub use error::{NotifyError, Result};
pub use manager::NotificationManager;
pub use notifier::Notifier;
