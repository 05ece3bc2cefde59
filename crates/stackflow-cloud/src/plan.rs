//! Plans: ordered, validated sequences of lifecycle steps

use crate::error::PlanError;
use crate::handle::{HandleKey, ResourceHandle, ResourceKind};
use crate::payload::Payload;
use crate::waiter::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Mutation a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Update => write!(f, "update"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

/// Fixed-delay retry for `Transient`/`InUse` errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            delay: Duration::from_secs(30),
        }
    }
}

/// Pause for an operator action the provider cannot observe on its own
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub prompt: String,
}

impl Checkpoint {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// One create/update/delete (+ optional wait) in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub label: String,
    pub handle: ResourceHandle,
    pub action: Action,
    pub payload: Payload,
    #[serde(default)]
    pub wait: Option<WaitPolicy>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
    /// Skip instead of failing when the resource is missing
    #[serde(default)]
    pub allow_absent: bool,
}

impl Step {
    fn new(handle: ResourceHandle, action: Action, payload: Payload) -> Self {
        let label = format!("{} {}", action, handle);
        Self {
            label,
            handle,
            action,
            payload,
            wait: None,
            retry: RetryPolicy::default(),
            checkpoint: None,
            allow_absent: false,
        }
    }

    pub fn create(handle: ResourceHandle, payload: Payload) -> Self {
        Self::new(handle, Action::Create, payload)
    }

    pub fn update(handle: ResourceHandle, payload: Payload) -> Self {
        Self::new(handle, Action::Update, payload)
    }

    pub fn delete(handle: ResourceHandle) -> Self {
        Self::new(handle, Action::Delete, Payload::None)
    }

    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    pub fn allow_absent(mut self) -> Self {
        self.allow_absent = true;
        self
    }

    pub fn is_destructive(&self) -> bool {
        self.action == Action::Delete || self.payload.is_destructive()
    }

    fn key(&self) -> HandleKey {
        self.handle.key()
    }
}

/// `dependent` references `dependency`; the dependency must outlive it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dependency {
    pub dependent: HandleKey,
    pub dependency: HandleKey,
}

/// Validated, ordered sequence of steps
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    name: String,
    steps: Vec<Step>,
    dependencies: Vec<Dependency>,
}

impl Plan {
    pub fn builder(name: impl Into<String>) -> PlanBuilder {
        PlanBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any step deletes or irreversibly changes a resource
    pub fn is_destructive(&self) -> bool {
        self.steps.iter().any(Step::is_destructive)
    }

    pub fn steps_by_action(&self, action: Action) -> Vec<&Step> {
        self.steps.iter().filter(|s| s.action == action).collect()
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.steps_by_action(Action::Create).len(),
            update: self.steps_by_action(Action::Update).len(),
            delete: self.steps_by_action(Action::Delete).len(),
            waits: self.steps.iter().filter(|s| s.wait.is_some()).count(),
        }
    }
}

/// Summary of planned steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub waits: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} wait(s)",
            self.create, self.update, self.delete, self.waits
        )
    }
}

/// Collects steps and dependencies, then validates ordering in [`PlanBuilder::build`]
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    name: String,
    steps: Vec<Step>,
    dependencies: BTreeSet<Dependency>,
}

impl PlanBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Declare that `dependent` references `dependency`
    pub fn depends_on(mut self, dependent: HandleKey, dependency: HandleKey) -> Self {
        self.dependencies.insert(Dependency {
            dependent,
            dependency,
        });
        self
    }

    pub fn build(self) -> Result<Plan, PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::EmptyPlan(self.name));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if let Some(wait) = &step.wait {
                wait.validate().map_err(|reason| PlanError::InvalidWaitPolicy {
                    step: index,
                    reason,
                })?;
            }
            if !step.payload.applies_to(step.handle.kind(), step.action) {
                return Err(PlanError::PayloadMismatch {
                    step: index,
                    kind: step.handle.kind(),
                    action: step.action,
                    payload: step.payload.name(),
                });
            }
            step.payload
                .validate()
                .map_err(|reason| PlanError::InvalidPayload {
                    step: index,
                    reason,
                })?;
        }

        check_handle_ids(&self.steps)?;

        let mut dependencies = self.dependencies;
        for step in &self.steps {
            for dependency in step.payload.references() {
                dependencies.insert(Dependency {
                    dependent: step.key(),
                    dependency,
                });
            }
            if let Some(parent) = step.handle.parent() {
                dependencies.insert(Dependency {
                    dependent: step.key(),
                    dependency: parent.clone(),
                });
            }
        }
        dependencies.retain(|d| d.dependent != d.dependency);

        check_acyclic(&dependencies)?;
        check_deletion_order(&self.steps, &dependencies)?;
        check_delete_prerequisites(&self.steps)?;

        Ok(Plan {
            name: self.name,
            steps: self.steps,
            dependencies: dependencies.into_iter().collect(),
        })
    }
}

fn check_handle_ids(steps: &[Step]) -> Result<(), PlanError> {
    let mut ids: BTreeMap<HandleKey, &str> = BTreeMap::new();
    for step in steps {
        let Some(id) = step.handle.id() else {
            continue;
        };
        match ids.get(&step.key()) {
            Some(first) if *first != id => {
                return Err(PlanError::ConflictingHandle {
                    key: step.key().to_string(),
                    first: first.to_string(),
                    second: id.to_string(),
                });
            }
            Some(_) => {}
            None => {
                ids.insert(step.key(), id);
            }
        }
    }
    Ok(())
}

fn check_acyclic(dependencies: &BTreeSet<Dependency>) -> Result<(), PlanError> {
    let mut graph: BTreeMap<&HandleKey, Vec<&HandleKey>> = BTreeMap::new();
    for dep in dependencies {
        graph.entry(&dep.dependent).or_default().push(&dep.dependency);
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        node: &'a HandleKey,
        graph: &BTreeMap<&'a HandleKey, Vec<&'a HandleKey>>,
        marks: &mut BTreeMap<&'a HandleKey, Mark>,
        path: &mut Vec<&'a HandleKey>,
    ) -> Result<(), PlanError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let cycle: Vec<String> = path
                    .iter()
                    .skip_while(|k| **k != node)
                    .chain(std::iter::once(&node))
                    .map(|k| k.to_string())
                    .collect();
                return Err(PlanError::DependencyCycle(cycle.join(" -> ")));
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        path.push(node);
        if let Some(next) = graph.get(node) {
            for dependency in next {
                visit(*dependency, graph, marks, path)?;
            }
        }
        path.pop();
        marks.insert(node, Mark::Done);
        Ok(())
    }

    let mut marks = BTreeMap::new();
    for node in graph.keys() {
        visit(*node, &graph, &mut marks, &mut Vec::new())?;
    }
    Ok(())
}

fn check_deletion_order(steps: &[Step], dependencies: &BTreeSet<Dependency>) -> Result<(), PlanError> {
    for (index, step) in steps.iter().enumerate() {
        if step.action != Action::Delete {
            continue;
        }
        let deleted = step.key();
        for dep in dependencies.iter().filter(|d| d.dependency == deleted) {
            let later = steps[index + 1..]
                .iter()
                .find(|s| s.key() == dep.dependent);
            match later {
                Some(s) if s.action == Action::Delete => {
                    return Err(PlanError::DependencyDeletedFirst {
                        step: index,
                        dependency: deleted.to_string(),
                        dependent: dep.dependent.to_string(),
                    });
                }
                Some(_) => {
                    return Err(PlanError::DependentTouchedAfterDelete {
                        step: index,
                        dependency: deleted.to_string(),
                        dependent: dep.dependent.to_string(),
                    });
                }
                None => {}
            }
        }
    }
    Ok(())
}

fn check_delete_prerequisites(steps: &[Step]) -> Result<(), PlanError> {
    for (index, step) in steps.iter().enumerate() {
        if step.action != Action::Delete {
            continue;
        }
        let (required, requirement): (Payload, &'static str) = match step.handle.kind() {
            ResourceKind::Distribution => (
                Payload::DistributionEnabled(false),
                "disables the distribution",
            ),
            ResourceKind::Bucket => (Payload::EmptyBucket, "empties the bucket"),
            _ => continue,
        };
        let prepared = steps[..index].iter().any(|s| {
            s.key() == step.key() && s.action == Action::Update && s.payload == required
        });
        if !prepared {
            return Err(PlanError::MissingPrerequisite {
                step: index,
                handle: step.handle.to_string(),
                requirement,
            });
        }
    }
    Ok(())
}
