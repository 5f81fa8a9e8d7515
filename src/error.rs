//! Error types for topograph

use thiserror::Error;

/// Main error type for topograph operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error detected before any API call
    #[error("validation error: {0}")]
    Validation(String),

    /// A declared dependency edge targets a resource that was never declared
    #[error("missing dependency: {dependent} depends on undeclared resource {target}")]
    MissingDependency {
        /// The resource carrying the edge
        dependent: String,
        /// The undeclared edge target
        target: String,
    },

    /// The dependency graph is not a DAG
    #[error("dependency cycle detected involving {0}")]
    CycleDetected(String),

    /// A resource id was declared twice
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// Late-bound template rendering error
    #[error("template error: {0}")]
    Template(String),

    /// Provisioning API rejected a request; prior resources remain
    #[error("provisioning error: {0}")]
    Provision(String),

    /// A pipeline phase command failed; no deployment mutation occurred
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a template error with the given message
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a provisioning error with the given message
    pub fn provision(msg: impl Into<String>) -> Self {
        Self::Provision(msg.into())
    }

    /// Create a pipeline error with the given message
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
