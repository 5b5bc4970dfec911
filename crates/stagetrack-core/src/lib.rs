//! stagetrack core - staged-workflow tracking engine.
//!
//! This crate tracks projects that move through an ordered set of stages with
//! dependency edges. A stage may only become terminal (`approved` or
//! `completed`) once all of its dependencies are terminal; when it does, ready
//! dependents are started automatically and every change is published as an
//! event.
//!
//! # Architecture
//!
//! - [`registry`]: immutable, validated stage definitions per workflow
//! - [`store`]: mutable per-project stage instances
//! - [`validator`]: dependency gate and optional lifecycle checks
//! - [`cascade`]: one-hop auto-advance of ready dependents
//! - [`events`]: event types and the synchronous event bus
//! - [`catalog`]: built-in and configured workflows by name
//! - [`repository`]: persistence boundary (memory and JSON file)
//! - [`coordinator`]: the inbound operations, serialized per project
//! - [`config`]: `.stagetrack/config.toml` loading
//!
//! # Example
//!
//! ```
//! use stagetrack_core::repository::memory::MemoryRepository;
//! use stagetrack_core::{
//!     EventBus, ProjectCoordinator, StageError, StageStatus, StageTracker, WorkflowCatalog,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> stagetrack_core::Result<()> {
//! let coordinator = ProjectCoordinator::new(
//!     WorkflowCatalog::builtin()?,
//!     Arc::new(MemoryRepository::new()),
//!     Arc::new(EventBus::new()),
//! );
//! let project = coordinator.create_project("design")?;
//!
//! // Concept design cannot be approved before the brief is
//! let err = coordinator
//!     .request_stage_transition(&project, "concept", StageStatus::Approved, "architect")
//!     .unwrap_err();
//! assert!(matches!(err, StageError::Precondition { .. }));
//! # Ok(())
//! # }
//! ```

pub mod cascade;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod project;
pub mod registry;
pub mod repository;
pub mod status;
pub mod store;
pub mod validator;

// Re-export core types for convenience
pub use catalog::{WorkflowCatalog, WorkflowEntry};
pub use config::{TrackerConfig, TrackerSettings, WorkflowConfig};
pub use coordinator::{ProjectCoordinator, StageTracker, TransitionOutcome};
pub use error::{ErrorKind, Result, StageError};
pub use events::{DeliveryReport, EventBus, EventKind, Publisher, StageEvent, SubscriptionId};
pub use project::{ProjectId, ProjectRecord, ProjectSummary};
pub use registry::{StageDefinition, StageRegistry};
pub use repository::ProjectRepository;
pub use status::StageStatus;
pub use store::{Note, StageInstance, StagePatch, StageStore};
pub use validator::TransitionPolicy;
