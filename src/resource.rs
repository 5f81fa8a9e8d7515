//! Kind-specific resource records
//!
//! A [`ResourceRecord`] is one node of the topology: a typed desired-state
//! description that serializes to the JSON payload handed to the
//! provisioning API. Records carry declaration only - no credentials, no
//! provider handles, no runtime state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::{ResourceId, ResourceKind};
use crate::identity::RoleSpec;
use crate::manifest::Manifest;
use crate::pipeline::{
    BuildProjectSpec, CommitTriggerSpec, RegistryRepositorySpec, SourceRepositorySpec,
};
use crate::Result;

// =============================================================================
// Infrastructure specs
// =============================================================================

/// Network partition the cluster is placed in
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Partition name
    pub name: String,
    /// Number of availability zones to spread subnets over
    pub max_availability_zones: u8,
}

/// Serverless orchestration cluster
///
/// The cluster schedules every pod onto provider-managed capacity through
/// its execution profiles; it owns no node groups.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Cluster name
    pub name: String,
    /// Orchestration engine version
    pub version: String,
    /// Network partition the cluster is placed in
    pub network: String,
    /// Administration role granted cluster-admin through the auth map
    pub admin_role: String,
}

/// Namespace selector on an execution profile
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSelector {
    /// Namespace whose pods the profile schedules
    pub namespace: String,
}

/// Execution profile mapping namespaces to provider-managed capacity
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProfileSpec {
    /// Profile name
    pub name: String,
    /// Cluster the profile belongs to
    pub cluster: String,
    /// Identity pods scheduled by this profile run as
    pub pod_execution_role: String,
    /// Namespaces the profile selects
    pub selectors: Vec<ProfileSelector>,
}

// =============================================================================
// Resource record
// =============================================================================

/// One typed node of the topology
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", content = "spec", rename_all = "camelCase")]
pub enum ResourceRecord {
    /// Network partition
    Network(NetworkSpec),
    /// Cloud identity with attached permissions
    Role(RoleSpec),
    /// Orchestration cluster
    Cluster(ClusterSpec),
    /// Serverless execution profile
    ExecutionProfile(ExecutionProfileSpec),
    /// In-cluster object
    Manifest(Manifest),
    /// Container registry repository
    RegistryRepository(RegistryRepositorySpec),
    /// Source repository reference
    SourceRepository(SourceRepositorySpec),
    /// Build project
    BuildProject(BuildProjectSpec),
    /// Commit-triggered build subscription
    CommitTrigger(CommitTriggerSpec),
}

impl ResourceRecord {
    /// The kind bucket this record falls in
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::Role(_) => ResourceKind::Role,
            Self::Cluster(_) => ResourceKind::Cluster,
            Self::ExecutionProfile(_) => ResourceKind::ExecutionProfile,
            Self::Manifest(_) => ResourceKind::Manifest,
            Self::RegistryRepository(_) => ResourceKind::RegistryRepository,
            Self::SourceRepository(_) => ResourceKind::SourceRepository,
            Self::BuildProject(_) => ResourceKind::BuildProject,
            Self::CommitTrigger(_) => ResourceKind::CommitTrigger,
        }
    }

    /// The record's declared name
    ///
    /// Manifests are named `<object-kind>/<name>` so objects of different
    /// in-cluster kinds can share a metadata name without colliding.
    pub fn name(&self) -> String {
        match self {
            Self::Network(s) => s.name.clone(),
            Self::Role(s) => s.name.clone(),
            Self::Cluster(s) => s.name.clone(),
            Self::ExecutionProfile(s) => s.name.clone(),
            Self::Manifest(m) => format!("{}/{}", m.kind().to_ascii_lowercase(), m.name()),
            Self::RegistryRepository(s) => s.name.clone(),
            Self::SourceRepository(s) => s.name.clone(),
            Self::BuildProject(s) => s.name.clone(),
            Self::CommitTrigger(s) => s.name.clone(),
        }
    }

    /// Stable identifier for this record
    pub fn id(&self) -> ResourceId {
        ResourceId::new(self.kind(), self.name())
    }

    /// Serialize the desired state handed to the provisioning API
    pub fn desired_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Namespace;

    #[test]
    fn manifest_ids_include_object_kind() {
        let record = ResourceRecord::Manifest(Manifest::Namespace(Namespace::new("payments")));
        assert_eq!(record.id().to_string(), "manifest/namespace/payments");
    }

    #[test]
    fn desired_state_is_kind_tagged() {
        let record = ResourceRecord::Network(NetworkSpec {
            name: "payments-vpc".to_string(),
            max_availability_zones: 3,
        });
        let value = record.desired_state().unwrap();
        assert_eq!(value["kind"], "network");
        assert_eq!(value["spec"]["maxAvailabilityZones"], 3);
    }
}
