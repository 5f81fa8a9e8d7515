//! Apply engine and the provisioning API seam
//!
//! [`ApplyEngine`] walks a planned resource graph in order, rendering each
//! record's late-bound `${...}` references against the values resolved so
//! far, and hands the fully-rendered desired state to a
//! [`ProvisioningApi`]. Rendering happens strictly before submission, so
//! the API never sees an unresolved placeholder; an unresolved reference is
//! a template error surfaced before any call is made for that resource.
//!
//! Apply is convergent: the API reports whether each resource was created,
//! updated, or already matched its desired state, and a second apply over
//! an unchanged graph reports zero changes. A provisioning failure stops
//! the walk at the failing resource; everything applied before it remains.
//!
//! [`MemoryApi`] is the in-process implementation: it stores desired state
//! and fabricates deterministic outputs, which is enough to exercise the
//! whole engine without a cloud account.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::graph::{ResourceGraph, ResourceId, ResourceKind};
use crate::template::{ResolvedValues, TemplateEngine};
use crate::{Error, Result};

// =============================================================================
// Provisioning API seam
// =============================================================================

/// What a create-or-update call did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeAction {
    /// The resource did not exist and was created
    Created,
    /// The resource existed with different desired state and was updated
    Updated,
    /// The resource already matched its desired state
    Unchanged,
}

/// Result of one create-or-update call
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    /// What the call did
    pub action: ChangeAction,
    /// Outputs the resource exposes to later resources, by dotted key
    pub outputs: BTreeMap<String, String>,
}

/// The seam between the engine and whatever provisions resources
///
/// Implementations must be idempotent: submitting the same desired state
/// twice reports [`ChangeAction::Unchanged`] the second time.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Converge one resource to its rendered desired state
    async fn create_or_update(&self, id: &ResourceId, desired: &Value) -> Result<ApplyOutcome>;

    /// Delete one resource; deleting an absent resource is not an error
    async fn delete(&self, id: &ResourceId) -> Result<()>;
}

// =============================================================================
// Apply report
// =============================================================================

/// One resource's change record within an apply
#[derive(Clone, Debug)]
pub struct ResourceChange {
    /// The resource
    pub id: ResourceId,
    /// What happened to it
    pub action: ChangeAction,
}

/// Outputs surfaced to the operator after a successful apply
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TopologyOutputs {
    /// Name of the source repository the pipeline tracks
    pub source_repository: Option<String>,
    /// Identifier of the registry repository images are pushed to
    pub registry_repository: Option<String>,
    /// Identifier of the build project
    pub build_project: Option<String>,
}

impl TopologyOutputs {
    fn from_values(values: &ResolvedValues) -> Self {
        Self {
            source_repository: values.get("source.name").map(str::to_string),
            registry_repository: values.get("repository.arn").map(str::to_string),
            build_project: values.get("project.arn").map(str::to_string),
        }
    }
}

/// Summary of one apply walk
#[derive(Clone, Debug)]
pub struct ApplyReport {
    /// Per-resource changes, in apply order
    pub changes: Vec<ResourceChange>,
    /// Operator-facing outputs
    pub outputs: TopologyOutputs,
}

impl ApplyReport {
    fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    /// Number of resources created
    pub fn created(&self) -> usize {
        self.count(ChangeAction::Created)
    }

    /// Number of resources updated
    pub fn updated(&self) -> usize {
        self.count(ChangeAction::Updated)
    }

    /// Number of resources already converged
    pub fn unchanged(&self) -> usize {
        self.count(ChangeAction::Unchanged)
    }

    /// Whether the apply made no changes at all
    pub fn is_converged(&self) -> bool {
        self.created() == 0 && self.updated() == 0
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Walks a planned graph against a provisioning API
pub struct ApplyEngine<A> {
    api: A,
    templates: TemplateEngine,
}

impl<A: ProvisioningApi> ApplyEngine<A> {
    /// Create an engine over the given API
    pub fn new(api: A) -> Result<Self> {
        Ok(Self {
            api,
            templates: TemplateEngine::new()?,
        })
    }

    /// The wrapped API, for inspection after a walk
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Apply the graph: plan, render, submit, accumulate outputs
    ///
    /// `region` seeds the resolved values, since it is known before any
    /// resource exists.
    pub async fn apply(&self, graph: &ResourceGraph, region: &str) -> Result<ApplyReport> {
        let order = graph.plan()?;
        let mut values = ResolvedValues::new();
        values.insert("region", region);

        let mut changes = Vec::with_capacity(order.len());
        for id in &order {
            let record = graph.get(id).ok_or_else(|| {
                Error::provision(format!("planned resource {id} is not in the graph"))
            })?;
            let desired = record.desired_state()?;
            let rendered = self.templates.render_json(&desired, &values)?;

            let outcome = self.api.create_or_update(id, &rendered).await?;
            tracing::debug!(resource = %id, action = ?outcome.action, "resource converged");
            values.merge(outcome.outputs);
            changes.push(ResourceChange {
                id: id.clone(),
                action: outcome.action,
            });
        }

        let report = ApplyReport {
            outputs: TopologyOutputs::from_values(&values),
            changes,
        };
        tracing::info!(
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            "apply complete"
        );
        Ok(report)
    }

    /// Tear the topology down in exact reverse apply order
    pub async fn teardown(&self, graph: &ResourceGraph) -> Result<Vec<ResourceId>> {
        let order = graph.teardown_order()?;
        for id in &order {
            self.api.delete(id).await?;
            tracing::debug!(resource = %id, "resource deleted");
        }
        tracing::info!(resources = order.len(), "teardown complete");
        Ok(order)
    }
}

// =============================================================================
// In-process API
// =============================================================================

/// In-process provisioning API with deterministic outputs
///
/// Stores the last desired state per resource; a resubmission with
/// identical desired state is reported unchanged. Outputs are pure
/// functions of the resource id, so repeated applies resolve identically.
#[derive(Debug, Default)]
pub struct MemoryApi {
    state: Mutex<BTreeMap<ResourceId, Value>>,
    deleted: Mutex<Vec<ResourceId>>,
}

impl MemoryApi {
    /// Create an empty API
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resources currently held
    pub fn resource_count(&self) -> usize {
        self.state.lock().expect("state lock").len()
    }

    /// The stored desired state for one resource
    pub fn desired_state(&self, id: &ResourceId) -> Option<Value> {
        self.state.lock().expect("state lock").get(id).cloned()
    }

    /// Ids deleted so far, in deletion order
    pub fn deletions(&self) -> Vec<ResourceId> {
        self.deleted.lock().expect("deleted lock").clone()
    }

    fn outputs_for(id: &ResourceId) -> BTreeMap<String, String> {
        let name = id.name.as_str();
        let entries: Vec<(&str, String)> = match id.kind {
            ResourceKind::Network => vec![("vpc.id", format!("vpc-{name}"))],
            ResourceKind::Cluster => vec![
                ("cluster.name", name.to_string()),
                ("cluster.arn", format!("arn:cluster:{name}")),
            ],
            ResourceKind::RegistryRepository => vec![
                ("repository.name", name.to_string()),
                ("repository.uri", format!("registry.local/{name}")),
                ("repository.arn", format!("arn:repository:{name}")),
            ],
            ResourceKind::SourceRepository => vec![("source.name", name.to_string())],
            ResourceKind::BuildProject => vec![
                ("project.name", name.to_string()),
                ("project.arn", format!("arn:project:{name}")),
            ],
            _ => Vec::new(),
        };
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }
}

#[async_trait]
impl ProvisioningApi for MemoryApi {
    async fn create_or_update(&self, id: &ResourceId, desired: &Value) -> Result<ApplyOutcome> {
        let mut state = self.state.lock().expect("state lock");
        let action = match state.get(id) {
            None => ChangeAction::Created,
            Some(existing) if existing == desired => ChangeAction::Unchanged,
            Some(_) => ChangeAction::Updated,
        };
        state.insert(id.clone(), desired.clone());
        Ok(ApplyOutcome {
            action,
            outputs: Self::outputs_for(id),
        })
    }

    async fn delete(&self, id: &ResourceId) -> Result<()> {
        self.state.lock().expect("state lock").remove(id);
        self.deleted.lock().expect("deleted lock").push(id.clone());
        Ok(())
    }
}
