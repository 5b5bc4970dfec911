//! Stage registry: the immutable definition of a workflow.
//!
//! A registry is built once per workflow type and shared read-only by every
//! project of that type. Construction validates the dependency graph so that
//! nothing downstream has to re-check it.

use crate::error::{Result, StageError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Immutable definition of one stage of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Unique id within the workflow (e.g. `"searches"`).
    pub id: String,

    /// Human-readable name (e.g. `"Property Searches"`).
    pub name: String,

    /// Ordering key; stages with equal positions keep declaration order.
    #[serde(default)]
    pub position: u32,

    /// Ids of stages that must be terminal before this one can be.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Whether an external party must approve this stage.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approval_required: bool,

    /// Estimated duration in days, used for critical path analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_days: Option<u32>,
}

impl StageDefinition {
    /// Creates a stage with no dependencies.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagetrack_core::StageDefinition;
    ///
    /// let stage = StageDefinition::new("survey", "Survey & Valuation", 3)
    ///     .depends_on(["instruction"])
    ///     .with_estimated_days(5);
    /// assert_eq!(stage.dependencies, vec!["instruction".to_string()]);
    /// ```
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, position: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position,
            dependencies: Vec::new(),
            approval_required: false,
            estimated_days: None,
        }
    }

    /// Adds dependencies, keeping declaration order.
    #[must_use]
    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Marks the stage as requiring external approval.
    #[must_use]
    pub fn requires_approval(mut self) -> Self {
        self.approval_required = true;
        self
    }

    /// Sets the estimated duration in days.
    #[must_use]
    pub fn with_estimated_days(mut self, days: u32) -> Self {
        self.estimated_days = Some(days);
        self
    }
}

/// Validated, ordered set of stages for one workflow type.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    workflow: String,
    stages: Vec<StageDefinition>,
    index: HashMap<String, usize>,
    /// stage id -> stages that depend on it, in registry order
    dependents: HashMap<String, Vec<String>>,
}

impl StageRegistry {
    /// Builds a registry from stage definitions.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `StageError::EmptyWorkflow` if `stages` is empty
    /// - `StageError::DuplicateStage` if two stages share an id
    /// - `StageError::UnknownDependency` if a dependency id is not defined
    /// - `StageError::CyclicDependency` if the graph has a cycle, including
    ///   a stage that depends on itself
    pub fn define(workflow: impl Into<String>, mut stages: Vec<StageDefinition>) -> Result<Self> {
        let workflow = workflow.into();
        if stages.is_empty() {
            return Err(StageError::EmptyWorkflow(workflow));
        }

        // Stable: equal positions keep declaration order
        stages.sort_by_key(|s| s.position);

        let mut index = HashMap::with_capacity(stages.len());
        for (i, stage) in stages.iter().enumerate() {
            if index.insert(stage.id.clone(), i).is_some() {
                return Err(StageError::DuplicateStage(stage.id.clone()));
            }
        }

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for stage in &stages {
            for dep in &stage.dependencies {
                if !index.contains_key(dep) {
                    return Err(StageError::UnknownDependency {
                        stage: stage.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                dependents
                    .entry(dep.clone())
                    .or_default()
                    .push(stage.id.clone());
            }
        }

        let registry = Self {
            workflow,
            stages,
            index,
            dependents,
        };
        registry.detect_cycles()?;

        tracing::debug!(
            workflow = %registry.workflow,
            stages = registry.stages.len(),
            "stage registry defined"
        );

        Ok(registry)
    }

    /// Name of the workflow type this registry describes.
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// All stages, ordered by position.
    pub fn stages(&self) -> &[StageDefinition] {
        &self.stages
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false for a successfully defined registry.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Looks up a stage by id.
    pub fn get(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.index.get(stage_id).map(|&i| &self.stages[i])
    }

    /// Looks up a stage by id, failing with `StageNotFound`.
    pub fn stage(&self, stage_id: &str) -> Result<&StageDefinition> {
        self.get(stage_id)
            .ok_or_else(|| StageError::StageNotFound(stage_id.to_string()))
    }

    /// Whether the registry defines `stage_id`.
    pub fn contains(&self, stage_id: &str) -> bool {
        self.index.contains_key(stage_id)
    }

    /// Position of `stage_id` in registry order.
    pub(crate) fn index_of(&self, stage_id: &str) -> Option<usize> {
        self.index.get(stage_id).copied()
    }

    /// Stages that declare `stage_id` as a dependency, in registry order.
    pub fn dependents(&self, stage_id: &str) -> &[String] {
        self.dependents
            .get(stage_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Stage ids in dependency order; ties broken by registry order.
    pub fn topological_order(&self) -> Vec<&str> {
        let mut in_degree: Vec<usize> = self.stages.iter().map(|s| s.dependencies.len()).collect();
        let mut order = Vec::with_capacity(self.stages.len());
        let mut emitted = vec![false; self.stages.len()];

        // Quadratic, but workflows have a handful of stages and the
        // output must be deterministic.
        while order.len() < self.stages.len() {
            let Some(next) = (0..self.stages.len()).find(|&i| !emitted[i] && in_degree[i] == 0)
            else {
                break;
            };
            emitted[next] = true;
            let id = self.stages[next].id.as_str();
            order.push(id);
            for dependent in self.dependents(id) {
                if let Some(j) = self.index_of(dependent) {
                    in_degree[j] -= 1;
                }
            }
        }

        order
    }

    /// Longest dependency chain weighted by `estimated_days`.
    ///
    /// Returns the chain (first stage first) and its total duration. Stages
    /// without an estimate count as zero days; ties go to the later stage so
    /// the chain runs through to the end of the workflow. Totals saturate at
    /// `u32::MAX`.
    pub fn critical_path(&self) -> (Vec<String>, u32) {
        let order = self.topological_order();
        let mut best: HashMap<&str, (u32, Option<&str>)> = HashMap::new();

        for &id in &order {
            let Some(stage) = self.get(id) else { continue };
            let own = stage.estimated_days.unwrap_or(0);
            let mut entry = (own, None);
            for dep in &stage.dependencies {
                if let Some(&(total, _)) = best.get(dep.as_str())
                    && total.saturating_add(own) >= entry.0
                {
                    entry = (total.saturating_add(own), Some(dep.as_str()));
                }
            }
            best.insert(id, entry);
        }

        let mut end: Option<(&str, u32)> = None;
        for &id in &order {
            let total = best.get(id).map(|e| e.0).unwrap_or(0);
            if end.is_none_or(|(_, t)| total >= t) {
                end = Some((id, total));
            }
        }

        let Some((mut current, total)) = end else {
            return (Vec::new(), 0);
        };
        let mut path = vec![current.to_string()];
        while let Some(&(_, Some(prev))) = best.get(current) {
            path.push(prev.to_string());
            current = prev;
        }
        path.reverse();
        (path, total)
    }

    /// Detect circular dependencies using DFS with a recursion stack.
    fn detect_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for stage in &self.stages {
            if !visited.contains(stage.id.as_str())
                && let Some(cycle) =
                    self.dfs_detect_cycle(&stage.id, &mut visited, &mut rec_stack, &mut path)
            {
                return Err(StageError::CyclicDependency { cycle });
            }
        }

        Ok(())
    }

    fn dfs_detect_cycle<'a>(
        &'a self,
        stage_id: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(stage_id);
        rec_stack.insert(stage_id);
        path.push(stage_id);

        if let Some(stage) = self.get(stage_id) {
            for dep in &stage.dependencies {
                let dep = dep.as_str();
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_detect_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let mut cycle = vec![dep.to_string()];
                    for p in path.iter().rev() {
                        cycle.push(p.to_string());
                        if *p == dep {
                            break;
                        }
                    }
                    cycle.reverse();
                    return Some(cycle);
                }
            }
        }

        path.pop();
        rec_stack.remove(stage_id);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_stage(id: &str, deps: &[&str]) -> StageDefinition {
        StageDefinition::new(id, id.to_uppercase(), 0).depends_on(deps.iter().copied())
    }

    #[test]
    fn test_define_simple_chain() {
        let registry = StageRegistry::define(
            "chain",
            vec![make_stage("a", &[]), make_stage("b", &["a"]), make_stage("c", &["b"])],
        )
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.workflow(), "chain");
        assert_eq!(registry.dependents("a"), ["b".to_string()]);
        assert!(registry.dependents("c").is_empty());
    }

    #[test]
    fn test_stages_sorted_by_position() {
        let registry = StageRegistry::define(
            "ordered",
            vec![
                StageDefinition::new("late", "Late", 2),
                StageDefinition::new("early", "Early", 1),
                StageDefinition::new("also-late", "Also Late", 2),
            ],
        )
        .unwrap();

        let ids: Vec<&str> = registry.stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late", "also-late"]);
    }

    #[test]
    fn test_detect_cycle() {
        let result = StageRegistry::define(
            "cyclic",
            vec![make_stage("a", &["c"]), make_stage("b", &["a"]), make_stage("c", &["b"])],
        );

        match result {
            Err(StageError::CyclicDependency { cycle }) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let result = StageRegistry::define("self", vec![make_stage("a", &["a"])]);
        match result {
            Err(StageError::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["a".to_string(), "a".to_string()]);
            }
            other => panic!("expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let result = StageRegistry::define("broken", vec![make_stage("a", &["ghost"])]);
        match result {
            Err(StageError::UnknownDependency { stage, dependency }) => {
                assert_eq!(stage, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_and_empty() {
        let dup = StageRegistry::define("dup", vec![make_stage("a", &[]), make_stage("a", &[])]);
        assert!(matches!(dup, Err(StageError::DuplicateStage(id)) if id == "a"));

        let empty = StageRegistry::define("empty", Vec::new());
        assert!(matches!(empty, Err(StageError::EmptyWorkflow(_))));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        let registry = StageRegistry::define(
            "diamond",
            vec![
                make_stage("a", &[]),
                make_stage("b", &["a"]),
                make_stage("c", &["a"]),
                make_stage("d", &["b", "c"]),
            ],
        )
        .unwrap();

        assert_eq!(registry.topological_order(), vec!["a", "b", "c", "d"]);
        assert_eq!(
            registry.dependents("a"),
            ["b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn test_topological_order_respects_dependencies_over_position() {
        let registry = StageRegistry::define(
            "reversed",
            vec![
                StageDefinition::new("final", "Final", 1).depends_on(["setup"]),
                StageDefinition::new("setup", "Setup", 2),
            ],
        )
        .unwrap();

        assert_eq!(registry.topological_order(), vec!["setup", "final"]);
    }

    #[test]
    fn test_critical_path_follows_longest_chain() {
        let registry = StageRegistry::define(
            "conveyancing",
            vec![
                make_stage("instruction", &[]).with_estimated_days(2),
                make_stage("searches", &["instruction"]).with_estimated_days(10),
                make_stage("survey", &["instruction"]).with_estimated_days(5),
                make_stage("mortgage", &["survey"]).with_estimated_days(14),
                make_stage("contracts", &["searches"]).with_estimated_days(7),
                make_stage("exchange", &["contracts", "mortgage"]).with_estimated_days(1),
            ],
        )
        .unwrap();

        let (path, days) = registry.critical_path();
        assert_eq!(path, vec!["instruction", "survey", "mortgage", "exchange"]);
        assert_eq!(days, 22);
    }

    #[test]
    fn test_critical_path_saturates_on_huge_estimates() {
        let registry = StageRegistry::define(
            "huge",
            vec![
                make_stage("a", &[]).with_estimated_days(u32::MAX),
                make_stage("b", &["a"]).with_estimated_days(1),
            ],
        )
        .unwrap();

        let (path, days) = registry.critical_path();
        assert_eq!(path, vec!["a", "b"]);
        assert_eq!(days, u32::MAX);
    }

    #[test]
    fn test_stage_lookup_not_found() {
        let registry = StageRegistry::define("one", vec![make_stage("a", &[])]).unwrap();
        assert!(registry.stage("a").is_ok());
        assert!(matches!(
            registry.stage("b"),
            Err(StageError::StageNotFound(id)) if id == "b"
        ));
    }
}
