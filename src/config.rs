//! Topology configuration
//!
//! A [`TopologyConfig`] names the project and carries every tunable the
//! synthesizer needs. Resource names are derived by composition through
//! methods on the config rather than interpolation against a module-level
//! constant, so the same declaration set can be instantiated under any
//! project name.

use serde::{Deserialize, Serialize};

use crate::{
    Error, Result, DEFAULT_CONTAINER_PORT, DEFAULT_HEALTH_CHECK_PATH, DEFAULT_MAX_AZS,
    DEFAULT_REPLICAS, DEFAULT_SERVICE_PORT, DEFAULT_TRACKED_BRANCH,
};

/// Configuration for a synthesized topology
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TopologyConfig {
    /// Project name - the stem every resource name is composed from
    pub project: String,

    /// Cloud region the topology is provisioned in
    pub region: String,

    /// Number of availability zones the network partition spreads over
    #[serde(default = "default_max_azs")]
    pub max_availability_zones: u8,

    /// Orchestration engine version for the cluster
    #[serde(default = "default_kubernetes_version")]
    pub kubernetes_version: String,

    /// Number of workload replicas
    #[serde(default = "default_replicas")]
    pub replicas: u32,

    /// Port the in-cluster service exposes
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Port the workload container listens on
    #[serde(default = "default_container_port")]
    pub container_port: u16,

    /// Health check path probed by the external load balancer
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,

    /// Source branch the commit trigger tracks
    #[serde(default = "default_tracked_branch")]
    pub tracked_branch: String,

    /// Ingress controller image
    #[serde(default = "default_controller_image")]
    pub controller_image: String,

    /// Metrics-forwarding sidecar image
    #[serde(default = "default_sidecar_image")]
    pub sidecar_image: String,

    /// Image the build service runs build phases in
    #[serde(default = "default_build_image")]
    pub build_image: String,
}

fn default_max_azs() -> u8 {
    DEFAULT_MAX_AZS
}

fn default_kubernetes_version() -> String {
    "1.29".to_string()
}

fn default_replicas() -> u32 {
    DEFAULT_REPLICAS
}

fn default_service_port() -> u16 {
    DEFAULT_SERVICE_PORT
}

fn default_container_port() -> u16 {
    DEFAULT_CONTAINER_PORT
}

fn default_health_check_path() -> String {
    DEFAULT_HEALTH_CHECK_PATH.to_string()
}

fn default_tracked_branch() -> String {
    DEFAULT_TRACKED_BRANCH.to_string()
}

fn default_controller_image() -> String {
    "docker.io/amazon/aws-alb-ingress-controller:v1.1.8".to_string()
}

fn default_sidecar_image() -> String {
    "amazon/cloudwatch-agent:latest".to_string()
}

fn default_build_image() -> String {
    "aws/codebuild/standard:7.0".to_string()
}

impl TopologyConfig {
    /// Create a config with defaults for everything but project and region
    pub fn new(project: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            max_availability_zones: default_max_azs(),
            kubernetes_version: default_kubernetes_version(),
            replicas: default_replicas(),
            service_port: default_service_port(),
            container_port: default_container_port(),
            health_check_path: default_health_check_path(),
            tracked_branch: default_tracked_branch(),
            controller_image: default_controller_image(),
            sidecar_image: default_sidecar_image(),
            build_image: default_build_image(),
        }
    }

    /// Parse a config from YAML and validate it
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// All violations here are configuration errors: fatal, reported before
    /// any resource is touched.
    pub fn validate(&self) -> Result<()> {
        if self.project.is_empty() {
            return Err(Error::validation("project name must not be empty"));
        }
        if self
            .project
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && c != '-')
        {
            return Err(Error::validation(format!(
                "project name '{}' may only contain alphanumerics and '-'",
                self.project
            )));
        }
        if self.region.is_empty() {
            return Err(Error::validation("region must not be empty"));
        }
        if self.max_availability_zones == 0 {
            return Err(Error::validation(
                "maxAvailabilityZones must be at least 1",
            ));
        }
        if self.replicas == 0 {
            return Err(Error::validation("replicas must be at least 1"));
        }
        if self.service_port == 0 || self.container_port == 0 {
            return Err(Error::validation("ports must be non-zero"));
        }
        if !self.health_check_path.starts_with('/') {
            return Err(Error::validation(format!(
                "healthCheckPath '{}' must start with '/'",
                self.health_check_path
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Name composition
    // =========================================================================

    /// Compose a resource name from the project stem and a suffix
    pub fn qualified(&self, suffix: &str) -> String {
        format!("{}-{}", self.project, suffix)
    }

    /// Namespace the workload runs in
    pub fn namespace(&self) -> &str {
        &self.project
    }

    /// Name of the application deployment (and its container)
    pub fn app_name(&self) -> &str {
        &self.project
    }

    /// Name of the in-cluster service
    pub fn service_name(&self) -> String {
        self.qualified("service")
    }

    /// Name of the ingress rule
    pub fn ingress_name(&self) -> String {
        self.qualified("ingress")
    }

    /// Name of the registry repository (one image stream per project)
    pub fn repository_name(&self) -> &str {
        &self.project
    }

    /// Name of the source repository the pipeline tracks
    pub fn source_repository_name(&self) -> &str {
        &self.project
    }

    /// Name of the build project
    pub fn build_project_name(&self) -> String {
        self.qualified("build")
    }

    /// Name of the observability sidecar configuration object
    pub fn sidecar_config_name(&self) -> String {
        "cwagentconfig-sidecar".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TopologyConfig {
        TopologyConfig::new("payments-poc", "us-east-1")
    }

    #[test]
    fn defaults_match_original_declaration() {
        let config = test_config();
        assert_eq!(config.max_availability_zones, 3);
        assert_eq!(config.replicas, 3);
        assert_eq!(config.service_port, 80);
        assert_eq!(config.container_port, 8080);
        assert_eq!(config.health_check_path, "/actuator/health");
    }

    #[test]
    fn names_compose_from_project() {
        let config = test_config();
        assert_eq!(config.namespace(), "payments-poc");
        assert_eq!(config.service_name(), "payments-poc-service");
        assert_eq!(config.ingress_name(), "payments-poc-ingress");
        assert_eq!(config.build_project_name(), "payments-poc-build");
    }

    #[test]
    fn parses_minimal_yaml() {
        let config = TopologyConfig::from_yaml("project: demo\nregion: eu-west-1\n")
            .expect("minimal config should parse");
        assert_eq!(config.project, "demo");
        assert_eq!(config.replicas, 3);
    }

    #[test]
    fn rejects_empty_project() {
        let mut config = test_config();
        config.project = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_project_characters() {
        let mut config = test_config();
        config.project = "has spaces".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("alphanumerics"));
    }

    #[test]
    fn rejects_zero_azs() {
        let mut config = test_config();
        config.max_availability_zones = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_relative_health_check_path() {
        let mut config = test_config();
        config.health_check_path = "health".to_string();
        assert!(config.validate().is_err());
    }
}
