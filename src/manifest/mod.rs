//! Typed in-cluster manifest objects
//!
//! Declarative records for the standard object shapes the topology applies
//! through the cluster's control plane: Namespace, ConfigMap, Deployment,
//! Service, Ingress, ServiceAccount, and the RBAC pair. Each record carries
//! API kind/version, metadata, and a kind-specific spec payload; the
//! [`Manifest`] enum unifies them for graph storage and serialization.
//!
//! Manifests are correlated by namespace membership, not strict ownership:
//! a namespaced manifest must be applied after its namespace exists, and a
//! manifest referencing a service account after that identity is
//! provisioned in-cluster. Those constraints surface as dependency edges in
//! [`crate::topology`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Result;

// =============================================================================
// Metadata
// =============================================================================

/// Standard Kubernetes ObjectMeta
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace; cluster-scoped objects have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create cluster-scoped metadata
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create namespaced metadata
    pub fn namespaced(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Namespace
// =============================================================================

/// Kubernetes Namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
}

impl Namespace {
    /// Create a namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
            metadata: ObjectMeta::cluster_scoped(name),
        }
    }
}

// =============================================================================
// ConfigMap
// =============================================================================

/// Kubernetes ConfigMap
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// String data entries
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create an empty config map
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
            data: BTreeMap::new(),
        }
    }

    /// Add a data entry
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

impl Deployment {
    /// Create a deployment from metadata and spec
    pub fn new(metadata: ObjectMeta, spec: DeploymentSpec) -> Self {
        Self {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            metadata,
            spec,
        }
    }
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    /// Label selector
    pub selector: LabelSelector,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Label selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    pub match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Selector matching a single label pair
    pub fn matching(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            match_labels: BTreeMap::from([(key.into(), value.into())]),
        }
    }
}

/// Pod template spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod metadata (subset of ObjectMeta)
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Service account the pods run as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Containers
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

/// Container spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Image pull policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl Container {
    /// Create a container with only name and image set
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            image_pull_policy: None,
            args: None,
            env: Vec::new(),
            ports: Vec::new(),
            resources: None,
            volume_mounts: Vec::new(),
        }
    }
}

/// Environment variable
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Value sourced from the pod's own fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    /// Literal environment variable
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    /// Environment variable sourced from a pod field path
    pub fn from_field(name: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: FieldRef {
                    field_path: field_path.into(),
                },
            }),
        }
    }
}

/// Environment variable source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    /// Pod field reference
    pub field_ref: FieldRef,
}

/// Pod field reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    /// Field path, e.g. `metadata.name`
    pub field_path: String,
}

/// Container port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    /// Port number
    pub container_port: u16,
}

/// Resource requirements
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// Requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,
    /// Limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

/// Resource quantity
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuantity {
    /// CPU
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Volume
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// ConfigMap source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapVolumeSource>,
}

/// ConfigMap volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapVolumeSource {
    /// ConfigMap name
    pub name: String,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

impl Service {
    /// Create a service from metadata and spec
    pub fn new(metadata: ObjectMeta, spec: ServiceSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Service".to_string(),
            metadata,
            spec,
        }
    }
}

/// Service spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Selector
    pub selector: BTreeMap<String, String>,
    /// Ports
    pub ports: Vec<ServicePort>,
    /// Service type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port number
    pub port: u16,
    /// Target port on the pod
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

// =============================================================================
// Ingress
// =============================================================================

/// Kubernetes Ingress rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: IngressSpec,
}

impl Ingress {
    /// Create an ingress from metadata and spec
    pub fn new(metadata: ObjectMeta, spec: IngressSpec) -> Self {
        Self {
            api_version: "extensions/v1beta1".to_string(),
            kind: "Ingress".to_string(),
            metadata,
            spec,
        }
    }
}

/// Ingress spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Routing rules
    pub rules: Vec<IngressRule>,
}

/// One ingress routing rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    /// HTTP paths for this rule
    pub http: HttpIngressRuleValue,
}

/// HTTP rule value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressRuleValue {
    /// Path list
    pub paths: Vec<HttpIngressPath>,
}

/// One path to backend mapping
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    /// Path pattern, e.g. `/*`
    pub path: String,
    /// Backend the path routes to
    pub backend: IngressBackend,
}

/// Ingress backend reference
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackend {
    /// Backend service name
    pub service_name: String,
    /// Backend service port
    pub service_port: u16,
}

// =============================================================================
// ServiceAccount
// =============================================================================

/// Kubernetes ServiceAccount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
}

impl ServiceAccount {
    /// Create a service account
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ServiceAccount".to_string(),
            metadata: ObjectMeta::namespaced(name, namespace),
        }
    }
}

// =============================================================================
// RBAC
// =============================================================================

/// One RBAC rule: API groups, resources, verbs
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// API groups the rule applies to
    pub api_groups: Vec<String>,
    /// Resource kinds the rule applies to
    pub resources: Vec<String>,
    /// Allowed verbs
    pub verbs: Vec<String>,
}

/// Cluster-scoped RBAC role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRole {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// RBAC rules
    pub rules: Vec<PolicyRule>,
}

impl ClusterRole {
    /// Create a cluster role
    pub fn new(metadata: ObjectMeta, rules: Vec<PolicyRule>) -> Self {
        Self {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "ClusterRole".to_string(),
            metadata,
            rules,
        }
    }
}

/// Binding of a cluster role to subjects
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleBinding {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Role being bound
    pub role_ref: RoleRef,
    /// Subjects receiving the role
    pub subjects: Vec<Subject>,
}

impl ClusterRoleBinding {
    /// Create a cluster role binding
    pub fn new(metadata: ObjectMeta, role_ref: RoleRef, subjects: Vec<Subject>) -> Self {
        Self {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "ClusterRoleBinding".to_string(),
            metadata,
            role_ref,
            subjects,
        }
    }
}

/// Reference to the role being bound
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// API group of the role
    pub api_group: String,
    /// Kind of the role
    pub kind: String,
    /// Name of the role
    pub name: String,
}

/// One binding subject
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject kind
    pub kind: String,
    /// Subject name
    pub name: String,
    /// Subject namespace
    pub namespace: String,
}

// =============================================================================
// Manifest enum
// =============================================================================

/// A declarative record for one in-cluster resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Manifest {
    /// Namespace
    Namespace(Namespace),
    /// ConfigMap
    ConfigMap(ConfigMap),
    /// Deployment
    Deployment(Deployment),
    /// Service
    Service(Service),
    /// Ingress
    Ingress(Ingress),
    /// ServiceAccount
    ServiceAccount(ServiceAccount),
    /// ClusterRole
    ClusterRole(ClusterRole),
    /// ClusterRoleBinding
    ClusterRoleBinding(ClusterRoleBinding),
}

impl Manifest {
    /// API kind of the wrapped object
    pub fn kind(&self) -> &str {
        match self {
            Self::Namespace(m) => &m.kind,
            Self::ConfigMap(m) => &m.kind,
            Self::Deployment(m) => &m.kind,
            Self::Service(m) => &m.kind,
            Self::Ingress(m) => &m.kind,
            Self::ServiceAccount(m) => &m.kind,
            Self::ClusterRole(m) => &m.kind,
            Self::ClusterRoleBinding(m) => &m.kind,
        }
    }

    /// Metadata of the wrapped object
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Namespace(m) => &m.metadata,
            Self::ConfigMap(m) => &m.metadata,
            Self::Deployment(m) => &m.metadata,
            Self::Service(m) => &m.metadata,
            Self::Ingress(m) => &m.metadata,
            Self::ServiceAccount(m) => &m.metadata,
            Self::ClusterRole(m) => &m.metadata,
            Self::ClusterRoleBinding(m) => &m.metadata,
        }
    }

    /// Object name
    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Namespace the object lives in, if namespaced
    pub fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    /// Serialize to a JSON value for submission
    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_serializes_port_mapping() {
        let service = Service::new(
            ObjectMeta::namespaced("app-service", "app"),
            ServiceSpec {
                selector: BTreeMap::from([("app".to_string(), "app".to_string())]),
                ports: vec![ServicePort {
                    port: 80,
                    target_port: Some(8080),
                    protocol: Some("TCP".to_string()),
                }],
                type_: Some("NodePort".to_string()),
            },
        );

        let value = Manifest::Service(service).to_value().unwrap();
        assert_eq!(value["spec"]["ports"][0]["port"], 80);
        assert_eq!(value["spec"]["ports"][0]["targetPort"], 8080);
        assert_eq!(value["spec"]["type"], "NodePort");
    }

    #[test]
    fn ingress_serializes_backend_reference() {
        let ingress = Ingress::new(
            ObjectMeta::namespaced("app-ingress", "app"),
            IngressSpec {
                rules: vec![IngressRule {
                    http: HttpIngressRuleValue {
                        paths: vec![HttpIngressPath {
                            path: "/*".to_string(),
                            backend: IngressBackend {
                                service_name: "app-service".to_string(),
                                service_port: 80,
                            },
                        }],
                    },
                }],
            },
        );

        let value = ingress.spec.rules[0].http.paths[0].clone();
        assert_eq!(value.path, "/*");
        assert_eq!(value.backend.service_name, "app-service");
        assert_eq!(value.backend.service_port, 80);

        let json = Manifest::Ingress(ingress).to_value().unwrap();
        assert_eq!(
            json["spec"]["rules"][0]["http"]["paths"][0]["backend"]["serviceName"],
            "app-service"
        );
    }

    #[test]
    fn cluster_scoped_metadata_omits_namespace() {
        let ns = Namespace::new("app");
        let value = Manifest::Namespace(ns).to_value().unwrap();
        assert_eq!(value["metadata"]["name"], "app");
        assert!(value["metadata"].get("namespace").is_none());
    }

    #[test]
    fn env_var_field_ref_serializes_camel_case() {
        let env = EnvVar::from_field("POD_NAME", "metadata.name");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["valueFrom"]["fieldRef"]["fieldPath"], "metadata.name");
    }
}
