//! Continuous delivery pipeline records
//!
//! The delivery pipeline is declared, not executed, here: a registry
//! repository for built images, a build project whose three-phase script is
//! handed to the external build service, and a commit trigger subscribing
//! the project to the tracked source branch. The build service injects
//! `CLUSTER_NAME` and `ECR_REPO_URI`; the build phase produces and pushes
//! exactly one image per invocation, tagged with the resolved source commit
//! identifier, and the post-build phase patches the running deployment's
//! image reference.
//!
//! [`PipelineRun`] models one end-to-end run (checkout, build-image,
//! push-image, patch-deployment) so the failure semantics are testable:
//! any phase failing aborts the run and leaves the previous deployment
//! image untouched.

use serde::{Deserialize, Serialize};

use crate::config::TopologyConfig;
use crate::identity::RoleSpec;
use crate::{Error, Result};

// =============================================================================
// Registry and source repositories
// =============================================================================

/// Container registry repository for built images
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRepositorySpec {
    /// Repository name
    pub name: String,
}

/// Reference to the source repository the pipeline tracks
///
/// The repository already exists on the source-control host; it is
/// referenced by name, never created or deleted by an apply.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRepositorySpec {
    /// Repository name on the source-control host
    pub name: String,
}

// =============================================================================
// Build spec
// =============================================================================

/// One build phase: an ordered list of shell commands
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildPhase {
    /// Commands executed in order; first non-zero exit aborts the run
    pub commands: Vec<String>,
}

/// The three-phase script handed to the external build service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BuildSpec {
    /// Build spec schema version
    pub version: String,
    /// Pre-build phase: environment setup, tag resolution
    pub pre_build: BuildPhase,
    /// Build phase: image build and push
    pub build: BuildPhase,
    /// Post-build phase: deployment patch
    pub post_build: BuildPhase,
}

impl BuildSpec {
    /// Compose the build script for a project
    ///
    /// `$ECR_REPO_URI` and `$CLUSTER_NAME` are build-service environment
    /// variables, resolved by the shell at run time, while the deployment
    /// name and namespace are composed from config at synth time.
    pub fn for_project(config: &TopologyConfig) -> Self {
        let app = config.app_name();
        let namespace = config.namespace();
        Self {
            version: "0.2".to_string(),
            pre_build: BuildPhase {
                commands: vec![
                    "env".to_string(),
                    "export TAG=$CODEBUILD_RESOLVED_SOURCE_VERSION".to_string(),
                    "/usr/local/bin/entrypoint.sh".to_string(),
                ],
            },
            build: BuildPhase {
                commands: vec![
                    "docker build -t $ECR_REPO_URI:$TAG .".to_string(),
                    "$(aws ecr get-login --no-include-email)".to_string(),
                    "docker push $ECR_REPO_URI:$TAG".to_string(),
                ],
            },
            post_build: BuildPhase {
                commands: vec![
                    format!("kubectl set image deployment {app} {app}=$ECR_REPO_URI:$TAG -n {namespace}"),
                    format!("kubectl get svc -n {namespace}"),
                ],
            },
        }
    }
}

// =============================================================================
// Build project and commit trigger
// =============================================================================

/// A build project: source, environment, script, and identity
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildProjectSpec {
    /// Project name
    pub name: String,
    /// Source repository the project checks out
    pub source_repository: String,
    /// Image the build phases run in
    pub build_image: String,
    /// Whether the build environment may run privileged (needed for docker)
    pub privileged: bool,
    /// Environment variables injected into every phase
    pub environment: Vec<(String, String)>,
    /// The three-phase script
    pub build_spec: BuildSpec,
    /// Identity the project runs as
    pub role: RoleSpec,
    /// Whether the project's identity is granted cluster administration
    /// through the cluster's auth map (applied by the provisioning engine)
    pub cluster_admin: bool,
}

/// Subscription firing a build on every commit to the tracked branch
///
/// The notification carries no payload the pipeline consumes beyond
/// triggering the run.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommitTriggerSpec {
    /// Trigger name
    pub name: String,
    /// Source repository the subscription is placed on
    pub source_repository: String,
    /// Build project started by the trigger
    pub build_project: String,
    /// Tracked branch
    pub branch: String,
}

// =============================================================================
// Pipeline run model
// =============================================================================

/// Phases of one pipeline run, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Check out the commit that fired the trigger
    Checkout,
    /// Build the container image, tagged with the commit id
    BuildImage,
    /// Push the tagged image to the registry
    PushImage,
    /// Patch the running deployment's image reference
    PatchDeployment,
}

impl PipelinePhase {
    fn name(self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::BuildImage => "build-image",
            Self::PushImage => "push-image",
            Self::PatchDeployment => "patch-deployment",
        }
    }
}

const PHASES: [PipelinePhase; 4] = [
    PipelinePhase::Checkout,
    PipelinePhase::BuildImage,
    PipelinePhase::PushImage,
    PipelinePhase::PatchDeployment,
];

/// Mutable deployment state a run patches on success
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeploymentState {
    /// Image reference the deployment currently runs
    pub image: String,
}

/// One end-to-end pipeline run for a single commit
#[derive(Clone, Debug)]
pub struct PipelineRun {
    repository_uri: String,
    commit: String,
}

impl PipelineRun {
    /// Create a run for the given registry URI and source commit
    pub fn new(repository_uri: impl Into<String>, commit: impl Into<String>) -> Result<Self> {
        let commit = commit.into();
        if commit.is_empty() {
            return Err(Error::validation("commit identifier must not be empty"));
        }
        Ok(Self {
            repository_uri: repository_uri.into(),
            commit,
        })
    }

    /// Image tag for this run: the resolved source commit identifier
    pub fn tag(&self) -> &str {
        &self.commit
    }

    /// Full image reference the run produces
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.repository_uri, self.commit)
    }

    /// Execute the run against the deployment state
    ///
    /// `fail_at` injects a failure in the named phase, standing in for a
    /// non-zero command exit. A failed phase aborts the run; the patch
    /// only happens after a successful push, so the previous image is
    /// never disturbed by a failed run. Failures are surfaced, not
    /// retried.
    pub fn execute(
        &self,
        state: &mut DeploymentState,
        fail_at: Option<PipelinePhase>,
    ) -> Result<String> {
        for phase in PHASES {
            if fail_at == Some(phase) {
                tracing::warn!(phase = phase.name(), commit = %self.commit, "pipeline phase failed");
                return Err(Error::pipeline(format!(
                    "phase {} failed for commit {}",
                    phase.name(),
                    self.commit
                )));
            }
            if phase == PipelinePhase::PatchDeployment {
                state.image = self.image_reference();
            }
        }
        tracing::info!(image = %self.image_reference(), "pipeline run complete");
        Ok(self.image_reference())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_run(commit: &str) -> PipelineRun {
        PipelineRun::new("registry.local/payments", commit).expect("run should build")
    }

    #[test]
    fn tags_image_with_commit_id() {
        let run = test_run("abc123");
        assert_eq!(run.tag(), "abc123");
        assert_eq!(run.image_reference(), "registry.local/payments:abc123");
    }

    #[test]
    fn successful_run_patches_deployment() {
        let run = test_run("abc123");
        let mut state = DeploymentState {
            image: "registry.local/payments:old".to_string(),
        };

        let image = run.execute(&mut state, None).unwrap();
        assert_eq!(image, "registry.local/payments:abc123");
        assert_eq!(state.image, "registry.local/payments:abc123");
    }

    #[test]
    fn failed_build_leaves_previous_image() {
        let run = test_run("abc123");
        let previous = DeploymentState {
            image: "registry.local/payments:known-good".to_string(),
        };

        for phase in [
            PipelinePhase::Checkout,
            PipelinePhase::BuildImage,
            PipelinePhase::PushImage,
        ] {
            let mut state = previous.clone();
            let result = run.execute(&mut state, Some(phase));
            assert!(matches!(result, Err(Error::Pipeline(_))));
            assert_eq!(state, previous, "no mutation after {} failure", phase.name());
        }
    }

    #[test]
    fn concurrent_runs_last_writer_wins() {
        let mut state = DeploymentState::default();

        test_run("commit-1").execute(&mut state, None).unwrap();
        test_run("commit-2").execute(&mut state, None).unwrap();

        assert_eq!(state.image, "registry.local/payments:commit-2");
    }

    #[test]
    fn rejects_empty_commit() {
        assert!(PipelineRun::new("registry.local/x", "").is_err());
    }

    #[test]
    fn build_spec_composes_phases() {
        let config = TopologyConfig::new("payments-poc", "us-east-1");
        let spec = BuildSpec::for_project(&config);

        assert_eq!(spec.version, "0.2");
        assert!(spec
            .pre_build
            .commands
            .contains(&"export TAG=$CODEBUILD_RESOLVED_SOURCE_VERSION".to_string()));
        assert!(spec.build.commands[0].starts_with("docker build -t $ECR_REPO_URI:$TAG"));
        assert!(spec.post_build.commands[0]
            .contains("kubectl set image deployment payments-poc payments-poc=$ECR_REPO_URI:$TAG"));
        assert!(spec.post_build.commands[0].ends_with("-n payments-poc"));
    }
}
