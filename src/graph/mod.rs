//! Resource dependency graph and apply planner
//!
//! The graph stores [`ResourceRecord`]s keyed by [`ResourceId`] together
//! with explicit dependency edges. Planning produces a single total apply
//! order via topological sort; ties are broken by declaration order, so a
//! given graph always plans identically. Teardown is the exact reverse.
//!
//! Edges are validated late: declaring an edge before its target exists is
//! fine, but a plan over a graph with an unsatisfied edge fails with
//! [`Error::MissingDependency`] before anything is applied. A graph that is
//! not a DAG fails with [`Error::CycleDetected`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resource::ResourceRecord;
use crate::{Error, Result};

// =============================================================================
// Identifiers
// =============================================================================

/// Kind bucket a resource record falls in
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    /// Network partition
    Network,
    /// Cloud identity
    Role,
    /// Orchestration cluster
    Cluster,
    /// Serverless execution profile
    ExecutionProfile,
    /// In-cluster object
    Manifest,
    /// Container registry repository
    RegistryRepository,
    /// Source repository reference
    SourceRepository,
    /// Build project
    BuildProject,
    /// Commit trigger subscription
    CommitTrigger,
}

impl ResourceKind {
    /// Stable lowercase name used in identifiers and logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Role => "role",
            Self::Cluster => "cluster",
            Self::ExecutionProfile => "executionProfile",
            Self::Manifest => "manifest",
            Self::RegistryRepository => "registryRepository",
            Self::SourceRepository => "sourceRepository",
            Self::BuildProject => "buildProject",
            Self::CommitTrigger => "commitTrigger",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of one graph node: kind plus name
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    /// Kind bucket
    pub kind: ResourceKind,
    /// Declared name, unique within the kind
    pub name: String,
}

impl ResourceId {
    /// Create an identifier
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// =============================================================================
// Graph
// =============================================================================

/// The topology: resource records plus dependency edges
#[derive(Clone, Debug, Default)]
pub struct ResourceGraph {
    // Declaration order is the planner's tie-break, so nodes live in a Vec
    // with a side index rather than a map.
    nodes: Vec<(ResourceId, ResourceRecord)>,
    index: BTreeMap<ResourceId, usize>,
    // (dependent, target); a set, so re-declaring an edge is a no-op.
    edges: BTreeSet<(ResourceId, ResourceId)>,
}

impl ResourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource
    ///
    /// Ids must be unique; declaring the same id twice is a hard error, not
    /// an overwrite.
    pub fn add(&mut self, record: ResourceRecord) -> Result<ResourceId> {
        let id = record.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateResource(id.to_string()));
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push((id.clone(), record));
        Ok(id)
    }

    /// Declare that `dependent` must be applied after `target`
    ///
    /// Either endpoint may be declared later; unsatisfied edges are caught
    /// when the graph is planned. A self-edge is rejected immediately.
    pub fn depends_on(&mut self, dependent: &ResourceId, target: &ResourceId) -> Result<()> {
        if dependent == target {
            return Err(Error::validation(format!(
                "resource {dependent} cannot depend on itself"
            )));
        }
        self.edges.insert((dependent.clone(), target.clone()));
        Ok(())
    }

    /// Look up a record by id
    pub fn get(&self, id: &ResourceId) -> Option<&ResourceRecord> {
        self.index.get(id).map(|&i| &self.nodes[i].1)
    }

    /// All declared records in declaration order
    pub fn resources(&self) -> impl Iterator<Item = (&ResourceId, &ResourceRecord)> {
        self.nodes.iter().map(|(id, record)| (id, record))
    }

    /// Direct dependencies of one resource
    pub fn dependencies_of<'a>(&'a self, id: &'a ResourceId) -> impl Iterator<Item = &'a ResourceId> {
        self.edges
            .iter()
            .filter(move |(dependent, _)| dependent == id)
            .map(|(_, target)| target)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Plan the total apply order
    ///
    /// Kahn's algorithm over declaration-indexed nodes: among the resources
    /// whose dependencies are all satisfied, the earliest-declared is
    /// applied next. The order is therefore a pure function of the
    /// declaration sequence.
    pub fn plan(&self) -> Result<Vec<ResourceId>> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (dependent, target) in &self.edges {
            let di = *self.index.get(dependent).ok_or_else(|| {
                Error::MissingDependency {
                    dependent: dependent.to_string(),
                    target: target.to_string(),
                }
            })?;
            let ti = *self.index.get(target).ok_or_else(|| {
                Error::MissingDependency {
                    dependent: dependent.to_string(),
                    target: target.to_string(),
                }
            })?;
            indegree[di] += 1;
            dependents[ti].push(di);
        }

        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        while order.len() < n {
            let next = (0..n).find(|&i| !emitted[i] && indegree[i] == 0);
            let Some(i) = next else {
                let stuck = (0..n)
                    .find(|&i| !emitted[i])
                    .map(|i| self.nodes[i].0.to_string())
                    .unwrap_or_default();
                return Err(Error::CycleDetected(stuck));
            };
            emitted[i] = true;
            order.push(self.nodes[i].0.clone());
            for &d in &dependents[i] {
                indegree[d] -= 1;
            }
        }

        tracing::debug!(resources = order.len(), "apply order planned");
        Ok(order)
    }

    /// Plan the teardown order: the exact reverse of the apply order
    pub fn teardown_order(&self) -> Result<Vec<ResourceId>> {
        let mut order = self.plan()?;
        order.reverse();
        Ok(order)
    }
}
