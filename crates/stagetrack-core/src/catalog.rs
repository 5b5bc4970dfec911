//! Named workflow registries.
//!
//! The catalog maps a workflow type name to its validated
//! [`StageRegistry`]. Four workflows are built in; more can be declared in
//! the config file.

use crate::config::{TrackerConfig, WorkflowConfig};
use crate::error::{Result, StageError};
use crate::registry::{StageDefinition, StageRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A registered workflow.
#[derive(Debug, Clone)]
pub struct WorkflowEntry {
    /// Short description for listings.
    pub description: String,
    /// Validated stage registry, shared by every project of this type.
    pub registry: Arc<StageRegistry>,
    /// Whether the workflow ships with the crate.
    pub builtin: bool,
}

/// Collection of workflow registries keyed by name.
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<String, WorkflowEntry>,
}

impl WorkflowCatalog {
    /// Creates a catalog with no workflows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the built-in workflows:
    /// `design`, `engineering`, `conveyancing` and `construction`.
    ///
    /// # Errors
    ///
    /// Only fails if a built-in definition is invalid.
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::empty();
        for (name, description, stages) in builtin_definitions() {
            catalog.insert(name, description, StageRegistry::define(name, stages)?, true)?;
        }
        Ok(catalog)
    }

    /// Builds the catalog described by `config`: the built-ins (unless
    /// disabled) plus every custom workflow.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DuplicateWorkflow` if a custom workflow reuses a
    /// registered name, or any registry construction error, which names the
    /// offending workflow in the log.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        let mut catalog = if config.tracker.builtin_workflows {
            Self::builtin()?
        } else {
            Self::empty()
        };

        for workflow in &config.workflows {
            catalog.register_config(workflow).inspect_err(|e| {
                tracing::error!(workflow = %workflow.name, error = %e, "invalid workflow definition");
            })?;
        }

        Ok(catalog)
    }

    /// Registers a custom workflow from its config table.
    ///
    /// # Errors
    ///
    /// See [`WorkflowCatalog::register`].
    pub fn register_config(&mut self, workflow: &WorkflowConfig) -> Result<()> {
        self.register(
            &workflow.name,
            &workflow.description,
            workflow.stages.clone(),
        )
    }

    /// Validates `stages` and registers them under `name`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DuplicateWorkflow` if `name` is taken, or any
    /// error from [`StageRegistry::define`].
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        stages: Vec<StageDefinition>,
    ) -> Result<()> {
        if self.workflows.contains_key(name) {
            return Err(StageError::DuplicateWorkflow(name.to_string()));
        }
        let registry = StageRegistry::define(name, stages)?;
        self.insert(name, description, registry, false)
    }

    fn insert(
        &mut self,
        name: &str,
        description: &str,
        registry: StageRegistry,
        builtin: bool,
    ) -> Result<()> {
        if self.workflows.contains_key(name) {
            return Err(StageError::DuplicateWorkflow(name.to_string()));
        }
        tracing::debug!(workflow = %name, stages = registry.len(), builtin, "workflow registered");
        self.workflows.insert(
            name.to_string(),
            WorkflowEntry {
                description: description.to_string(),
                registry: Arc::new(registry),
                builtin,
            },
        );
        Ok(())
    }

    /// Looks up the registry of a workflow.
    ///
    /// # Errors
    ///
    /// Returns `StageError::UnknownWorkflow` if no workflow has this name.
    pub fn get(&self, name: &str) -> Result<Arc<StageRegistry>> {
        self.entry(name).map(|e| Arc::clone(&e.registry))
    }

    /// Looks up a workflow entry.
    ///
    /// # Errors
    ///
    /// Returns `StageError::UnknownWorkflow` if no workflow has this name.
    pub fn entry(&self, name: &str) -> Result<&WorkflowEntry> {
        self.workflows
            .get(name)
            .ok_or_else(|| StageError::UnknownWorkflow(name.to_string()))
    }

    /// Workflow names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    /// Iterates over workflows in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkflowEntry)> {
        self.workflows.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of registered workflows.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Whether no workflow is registered.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

type BuiltinDefinition = (&'static str, &'static str, Vec<StageDefinition>);

fn builtin_definitions() -> Vec<BuiltinDefinition> {
    vec![
        (
            "design",
            "Architectural design stages with professional approval",
            vec![
                StageDefinition::new("inception", "Inception & Brief", 1).with_estimated_days(14),
                StageDefinition::new("concept", "Concept Design", 2)
                    .depends_on(["inception"])
                    .requires_approval()
                    .with_estimated_days(28),
                StageDefinition::new("developed", "Developed Design", 3)
                    .depends_on(["concept"])
                    .requires_approval()
                    .with_estimated_days(42),
                StageDefinition::new("technical", "Technical Design", 4)
                    .depends_on(["developed"])
                    .requires_approval()
                    .with_estimated_days(56),
            ],
        ),
        (
            "engineering",
            "Engineering survey, design and sign-off",
            vec![
                StageDefinition::new("survey", "Site Survey & Analysis", 1).with_estimated_days(14),
                StageDefinition::new("design", "Engineering Design", 2)
                    .depends_on(["survey"])
                    .with_estimated_days(42),
                StageDefinition::new("coordination", "Cross-Discipline Coordination", 3)
                    .depends_on(["design"])
                    .with_estimated_days(14),
                StageDefinition::new("approval", "Final Approval & Sign-off", 4)
                    .depends_on(["coordination"])
                    .requires_approval()
                    .with_estimated_days(14),
            ],
        ),
        (
            "conveyancing",
            "Residential conveyancing from instruction to completion",
            vec![
                StageDefinition::new("instruction", "Instruction & Initial Checks", 1)
                    .with_estimated_days(2),
                StageDefinition::new("searches", "Property Searches", 2)
                    .depends_on(["instruction"])
                    .with_estimated_days(10),
                StageDefinition::new("survey", "Survey & Valuation", 3)
                    .depends_on(["instruction"])
                    .with_estimated_days(5),
                StageDefinition::new("mortgage", "Mortgage Arrangements", 4)
                    .depends_on(["survey"])
                    .with_estimated_days(14),
                StageDefinition::new("contracts", "Contract Preparation", 5)
                    .depends_on(["searches"])
                    .with_estimated_days(7),
                StageDefinition::new("exchange", "Exchange of Contracts", 6)
                    .depends_on(["contracts", "mortgage"])
                    .with_estimated_days(1),
                StageDefinition::new("completion", "Completion", 7)
                    .depends_on(["exchange"])
                    .with_estimated_days(21),
            ],
        ),
        (
            "construction",
            "Construction programme from planning to handover",
            vec![
                StageDefinition::new("planning", "Planning & Design", 1).with_estimated_days(61),
                StageDefinition::new("foundation", "Foundation Works", 2)
                    .depends_on(["planning"])
                    .with_estimated_days(45),
                StageDefinition::new("structure", "Structural Works", 3)
                    .depends_on(["foundation"])
                    .with_estimated_days(77),
                StageDefinition::new("envelope", "Building Envelope", 4)
                    .depends_on(["structure"])
                    .with_estimated_days(76),
                StageDefinition::new("fit_out", "Fit-Out Works", 5)
                    .depends_on(["envelope"])
                    .with_estimated_days(106),
                StageDefinition::new("completion", "Completion & Handover", 6)
                    .depends_on(["fit_out"])
                    .with_estimated_days(61),
            ],
        ),
    ]
}
