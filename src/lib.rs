//! Topograph - declarative cloud topology synthesizer and apply planner
//!
//! Topograph models a cloud deployment topology as a graph of named, typed
//! resource records: a serverless Kubernetes cluster fronted by an ingress
//! controller, wired to a container registry and a commit-triggered delivery
//! pipeline. The crate's job is the desired-state model and its dependency
//! ordering - every runtime behavior (container scheduling, load-balancer
//! reconciliation, build execution) is delegated to the provisioning engine
//! and in-cluster controllers behind the [`engine::ProvisioningApi`] seam.
//!
//! # Architecture
//!
//! - A [`config::TopologyConfig`] names the project and its tunables
//! - [`topology::TopologySynthesizer`] composes the full resource graph
//! - [`graph::ResourceGraph`] plans a total apply order (Kahn's algorithm)
//! - [`engine::ApplyEngine`] walks the plan, resolving late-bound values
//!   as resource outputs become known, and converges idempotently
//!
//! # Modules
//!
//! - [`config`] - Topology configuration and name composition
//! - [`graph`] - Resource dependency graph and apply planner
//! - [`identity`] - Permission statements, policy documents, role catalog
//! - [`manifest`] - Typed in-cluster objects (Namespace, Deployment, ...)
//! - [`template`] - Late-bound `${...}` value substitution
//! - [`pipeline`] - Build spec, registry, build project, commit trigger
//! - [`resource`] - Kind-specific resource records
//! - [`topology`] - The synthesizer composing config into a graph
//! - [`engine`] - Apply engine and the provisioning API seam
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod identity;
pub mod manifest;
pub mod pipeline;
pub mod resource;
pub mod template;
pub mod topology;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralized so config defaults and test fixtures stay consistent.

/// Default port the in-cluster service listens on
pub const DEFAULT_SERVICE_PORT: u16 = 80;

/// Default port the workload container listens on
pub const DEFAULT_CONTAINER_PORT: u16 = 8080;

/// Default number of workload replicas
pub const DEFAULT_REPLICAS: u32 = 3;

/// Default number of availability zones for the network partition
pub const DEFAULT_MAX_AZS: u8 = 3;

/// Default ingress health check path
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/actuator/health";

/// Default source branch tracked by the commit trigger
pub const DEFAULT_TRACKED_BRANCH: &str = "main";

/// Namespace the ingress controller runs in
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Name shared by the ingress controller identity and its RBAC objects
pub const INGRESS_CONTROLLER_NAME: &str = "alb-ingress-controller";
