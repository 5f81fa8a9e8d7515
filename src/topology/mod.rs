//! Topology synthesis
//!
//! [`TopologySynthesizer`] turns a validated [`TopologyConfig`] into the
//! full resource graph: network partition, administration and execution
//! identities, serverless cluster, ingress controller stack, workload
//! deployment with its metrics sidecar, public routing, and the
//! commit-triggered delivery pipeline. Synthesis is pure - no API is
//! touched, and the same config always yields the same graph, so the
//! planner's output is reproducible.
//!
//! Late-bound attributes (cluster name, network partition id, registry
//! URI, region) are declared as `${...}` placeholders and resolved by the
//! apply engine once the owning resource reports its outputs. Every
//! placeholder is backed by a dependency edge, so rendering can never run
//! ahead of provisioning.

use crate::config::TopologyConfig;
use crate::graph::ResourceGraph;
use crate::identity::{self, RoleSpec};
use crate::manifest::{
    ClusterRole, ClusterRoleBinding, ConfigMap, Container, ContainerPort, Deployment,
    DeploymentSpec, EnvVar, HttpIngressPath, HttpIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressSpec, LabelSelector, Manifest, Namespace, ObjectMeta, PodMeta, PodSpec,
    PolicyRule, ResourceQuantity, ResourceRequirements, RoleRef, Service, ServiceAccount,
    ServicePort, ServiceSpec, Subject, Volume, ConfigMapVolumeSource, VolumeMount,
    PodTemplateSpec,
};
use crate::pipeline::{
    BuildProjectSpec, BuildSpec, CommitTriggerSpec, RegistryRepositorySpec, SourceRepositorySpec,
};
use crate::resource::{
    ClusterSpec, ExecutionProfileSpec, NetworkSpec, ProfileSelector, ResourceRecord,
};
use crate::{Result, INGRESS_CONTROLLER_NAME, SYSTEM_NAMESPACE};

/// Label key the ingress controller objects are correlated by
const CONTROLLER_LABEL: &str = "app.kubernetes.io/name";

/// Label key the workload objects are correlated by
const APP_LABEL: &str = "app";

/// Synthesizes the resource graph for one project
pub struct TopologySynthesizer {
    config: TopologyConfig,
}

impl TopologySynthesizer {
    /// Create a synthesizer over a validated config
    pub fn new(config: TopologyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The config this synthesizer was built from
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Synthesize the complete resource graph
    pub fn synthesize(&self) -> Result<ResourceGraph> {
        let mut graph = ResourceGraph::new();
        let c = &self.config;

        // Declaration order is the planner's tie-break; infrastructure
        // first, then in-cluster objects, then the pipeline.
        let source = graph.add(ResourceRecord::SourceRepository(SourceRepositorySpec {
            name: c.source_repository_name().to_string(),
        }))?;
        let registry = graph.add(ResourceRecord::RegistryRepository(RegistryRepositorySpec {
            name: c.repository_name().to_string(),
        }))?;
        let network = graph.add(ResourceRecord::Network(NetworkSpec {
            name: c.qualified("vpc"),
            max_availability_zones: c.max_availability_zones,
        }))?;
        let admin = graph.add(ResourceRecord::Role(identity::cluster_admin(
            c.qualified("admin"),
        )))?;
        let cluster = graph.add(ResourceRecord::Cluster(ClusterSpec {
            name: c.qualified("eks"),
            version: c.kubernetes_version.clone(),
            network: c.qualified("vpc"),
            admin_role: c.qualified("admin"),
        }))?;
        let namespace = graph.add(ResourceRecord::Manifest(Manifest::Namespace(
            Namespace::new(c.namespace()),
        )))?;
        let pod_role = graph.add(ResourceRecord::Role(identity::pod_execution(
            c.qualified("pod-role"),
        )?))?;
        let profile = graph.add(ResourceRecord::ExecutionProfile(ExecutionProfileSpec {
            name: c.qualified("profile"),
            cluster: c.qualified("eks"),
            pod_execution_role: c.qualified("pod-role"),
            selectors: vec![ProfileSelector {
                namespace: c.namespace().to_string(),
            }],
        }))?;

        let controller_role = graph.add(ResourceRecord::Role(self.controller_role()?))?;
        let account = graph.add(ResourceRecord::Manifest(self.controller_account()))?;
        let rbac_role = graph.add(ResourceRecord::Manifest(self.controller_rbac_role()))?;
        let rbac_binding = graph.add(ResourceRecord::Manifest(self.controller_rbac_binding()))?;
        let controller = graph.add(ResourceRecord::Manifest(self.controller_deployment()))?;

        let sidecar_config = graph.add(ResourceRecord::Manifest(self.sidecar_config()?))?;
        let workload = graph.add(ResourceRecord::Manifest(self.workload_deployment()))?;
        let service = graph.add(ResourceRecord::Manifest(self.service()))?;
        let ingress = graph.add(ResourceRecord::Manifest(self.ingress()))?;

        let build = graph.add(ResourceRecord::BuildProject(self.build_project()?))?;
        let trigger = graph.add(ResourceRecord::CommitTrigger(CommitTriggerSpec {
            name: c.qualified("trigger"),
            source_repository: c.source_repository_name().to_string(),
            build_project: c.build_project_name(),
            branch: c.tracked_branch.clone(),
        }))?;

        // Structural edges.
        graph.depends_on(&cluster, &network)?;
        graph.depends_on(&cluster, &admin)?;
        graph.depends_on(&profile, &cluster)?;
        graph.depends_on(&profile, &pod_role)?;

        // Every in-cluster object is applied through the cluster's control
        // plane.
        for manifest in [
            &namespace,
            &account,
            &rbac_role,
            &rbac_binding,
            &controller,
            &sidecar_config,
            &workload,
            &service,
            &ingress,
        ] {
            graph.depends_on(manifest, &cluster)?;
        }

        // The controller's cloud identity backs its service account; the
        // RBAC pair and the controller pods in turn require the account.
        graph.depends_on(&account, &controller_role)?;
        graph.depends_on(&rbac_role, &account)?;
        graph.depends_on(&rbac_binding, &account)?;
        graph.depends_on(&rbac_binding, &rbac_role)?;
        graph.depends_on(&controller, &account)?;

        // Data-flow edges backing ${...} placeholders.
        graph.depends_on(&controller, &network)?;
        graph.depends_on(&workload, &registry)?;
        graph.depends_on(&build, &registry)?;
        graph.depends_on(&build, &cluster)?;
        graph.depends_on(&build, &source)?;

        // Workload ordering within the namespace.
        graph.depends_on(&sidecar_config, &namespace)?;
        graph.depends_on(&workload, &sidecar_config)?;
        graph.depends_on(&workload, &namespace)?;
        graph.depends_on(&service, &workload)?;
        graph.depends_on(&service, &controller)?;
        graph.depends_on(&service, &namespace)?;
        graph.depends_on(&ingress, &service)?;
        graph.depends_on(&ingress, &namespace)?;

        // The trigger wires source commits to the build project.
        graph.depends_on(&trigger, &source)?;
        graph.depends_on(&trigger, &build)?;

        tracing::info!(
            project = %c.project,
            resources = graph.len(),
            "topology synthesized"
        );
        Ok(graph)
    }

    // =========================================================================
    // Ingress controller stack
    // =========================================================================

    fn controller_role(&self) -> Result<RoleSpec> {
        let mut role = identity::RoleSpec::new(
            INGRESS_CONTROLLER_NAME,
            identity::Principal::Service("pods.eks.amazonaws.com".to_string()),
        );
        role.policy = identity::ingress_controller_policy()?;
        Ok(role)
    }

    fn controller_meta(&self) -> ObjectMeta {
        ObjectMeta::namespaced(INGRESS_CONTROLLER_NAME, SYSTEM_NAMESPACE)
            .with_label(CONTROLLER_LABEL, INGRESS_CONTROLLER_NAME)
    }

    fn controller_account(&self) -> Manifest {
        let mut account = ServiceAccount::new(INGRESS_CONTROLLER_NAME, SYSTEM_NAMESPACE);
        account.metadata = self.controller_meta();
        Manifest::ServiceAccount(account)
    }

    fn controller_rbac_role(&self) -> Manifest {
        let meta = ObjectMeta::cluster_scoped(INGRESS_CONTROLLER_NAME)
            .with_label(CONTROLLER_LABEL, INGRESS_CONTROLLER_NAME);
        Manifest::ClusterRole(ClusterRole::new(
            meta,
            vec![
                PolicyRule {
                    api_groups: vec!["".to_string(), "extensions".to_string()],
                    resources: [
                        "configmaps",
                        "endpoints",
                        "events",
                        "ingresses",
                        "ingresses/status",
                        "services",
                    ]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                    verbs: ["create", "get", "list", "update", "watch", "patch"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                },
                PolicyRule {
                    api_groups: vec!["".to_string(), "extensions".to_string()],
                    resources: ["nodes", "pods", "secrets", "services", "namespaces"]
                        .iter()
                        .map(|s| s.to_string())
                        .collect(),
                    verbs: ["get", "list", "watch"].iter().map(|s| s.to_string()).collect(),
                },
            ],
        ))
    }

    fn controller_rbac_binding(&self) -> Manifest {
        let meta = ObjectMeta::cluster_scoped(INGRESS_CONTROLLER_NAME)
            .with_label(CONTROLLER_LABEL, INGRESS_CONTROLLER_NAME);
        Manifest::ClusterRoleBinding(ClusterRoleBinding::new(
            meta,
            RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: INGRESS_CONTROLLER_NAME.to_string(),
            },
            vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: INGRESS_CONTROLLER_NAME.to_string(),
                namespace: SYSTEM_NAMESPACE.to_string(),
            }],
        ))
    }

    fn controller_deployment(&self) -> Manifest {
        let mut container =
            Container::new(INGRESS_CONTROLLER_NAME, self.config.controller_image.clone());
        container.args = Some(vec![
            "--ingress-class=alb".to_string(),
            "--cluster-name=${cluster.name}".to_string(),
            "--aws-vpc-id=${vpc.id}".to_string(),
            "--aws-region=${region}".to_string(),
        ]);

        Manifest::Deployment(Deployment::new(
            self.controller_meta(),
            DeploymentSpec {
                replicas: None,
                selector: LabelSelector::matching(CONTROLLER_LABEL, INGRESS_CONTROLLER_NAME),
                template: PodTemplateSpec {
                    metadata: PodMeta {
                        labels: [(CONTROLLER_LABEL.to_string(), INGRESS_CONTROLLER_NAME.to_string())]
                            .into(),
                    },
                    spec: PodSpec {
                        service_account_name: Some(INGRESS_CONTROLLER_NAME.to_string()),
                        containers: vec![container],
                        volumes: Vec::new(),
                    },
                },
            },
        ))
    }

    // =========================================================================
    // Workload
    // =========================================================================

    fn sidecar_config(&self) -> Result<Manifest> {
        let agent_config = serde_json::json!({
            "agent": {
                "omit_hostname": true,
                "region": self.config.region,
            },
            "metrics": {
                "metrics_collected": {
                    "statsd": { "service_address": ":8125" }
                }
            },
            "logs": {
                "metrics_collected": { "emf": {} }
            },
            "csm": {
                "service_addresses": ["udp4://127.0.0.1:31000", "udp6://[::1]:31000"],
                "memory_limit_in_mb": 20
            }
        });
        let config_map = ConfigMap::new(self.config.sidecar_config_name(), self.config.namespace())
            .with_data(
                "cwagentconfig.json",
                serde_json::to_string_pretty(&agent_config)?,
            );
        Ok(Manifest::ConfigMap(config_map))
    }

    fn workload_deployment(&self) -> Manifest {
        let c = &self.config;

        let mut app = Container::new(c.app_name(), "${repository.uri}:latest");
        app.image_pull_policy = Some("Always".to_string());
        app.ports = vec![ContainerPort {
            container_port: c.container_port,
        }];
        app.env = vec![
            EnvVar::literal("AWS_CSM_ENABLED", "true"),
            EnvVar::literal("AWS_CSM_PORT", "31000"),
            EnvVar::literal("AWS_CSM_HOST", "127.0.0.1"),
        ];

        let mut sidecar = Container::new("cloudwatch-agent", c.sidecar_image.clone());
        sidecar.image_pull_policy = Some("Always".to_string());
        sidecar.env = vec![EnvVar::from_field("POD_NAME", "metadata.name")];
        sidecar.resources = Some(ResourceRequirements {
            limits: Some(ResourceQuantity {
                cpu: Some("100m".to_string()),
                memory: Some("100Mi".to_string()),
            }),
            requests: Some(ResourceQuantity {
                cpu: Some("32m".to_string()),
                memory: Some("24Mi".to_string()),
            }),
        });
        sidecar.volume_mounts = vec![VolumeMount {
            name: "cwagentconfig".to_string(),
            mount_path: "/etc/cwagentconfig".to_string(),
        }];

        Manifest::Deployment(Deployment::new(
            ObjectMeta::namespaced(c.app_name(), c.namespace()),
            DeploymentSpec {
                replicas: Some(c.replicas),
                selector: LabelSelector::matching(APP_LABEL, c.app_name()),
                template: PodTemplateSpec {
                    metadata: PodMeta {
                        labels: [(APP_LABEL.to_string(), c.app_name().to_string())].into(),
                    },
                    spec: PodSpec {
                        service_account_name: None,
                        containers: vec![app, sidecar],
                        volumes: vec![Volume {
                            name: "cwagentconfig".to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: c.sidecar_config_name(),
                            }),
                        }],
                    },
                },
            },
        ))
    }

    fn service(&self) -> Manifest {
        let c = &self.config;
        Manifest::Service(Service::new(
            ObjectMeta::namespaced(c.service_name(), c.namespace()),
            ServiceSpec {
                selector: [(APP_LABEL.to_string(), c.app_name().to_string())].into(),
                ports: vec![ServicePort {
                    port: c.service_port,
                    target_port: Some(c.container_port),
                    protocol: Some("TCP".to_string()),
                }],
                type_: Some("NodePort".to_string()),
            },
        ))
    }

    fn ingress(&self) -> Manifest {
        let c = &self.config;
        let meta = ObjectMeta::namespaced(c.ingress_name(), c.namespace())
            .with_label(APP_LABEL, c.ingress_name())
            .with_annotation("kubernetes.io/ingress.class", "alb")
            .with_annotation("alb.ingress.kubernetes.io/scheme", "internet-facing")
            .with_annotation("alb.ingress.kubernetes.io/target-type", "ip")
            .with_annotation(
                "alb.ingress.kubernetes.io/healthcheck-path",
                c.health_check_path.clone(),
            );
        Manifest::Ingress(Ingress::new(
            meta,
            IngressSpec {
                rules: vec![IngressRule {
                    http: HttpIngressRuleValue {
                        paths: vec![HttpIngressPath {
                            path: "/*".to_string(),
                            backend: IngressBackend {
                                service_name: c.service_name(),
                                service_port: c.service_port,
                            },
                        }],
                    },
                }],
            },
        ))
    }

    // =========================================================================
    // Delivery pipeline
    // =========================================================================

    fn build_project(&self) -> Result<BuildProjectSpec> {
        let c = &self.config;
        Ok(BuildProjectSpec {
            name: c.build_project_name(),
            source_repository: c.source_repository_name().to_string(),
            build_image: c.build_image.clone(),
            privileged: true,
            environment: vec![
                ("CLUSTER_NAME".to_string(), "${cluster.name}".to_string()),
                ("ECR_REPO_URI".to_string(), "${repository.uri}".to_string()),
            ],
            build_spec: BuildSpec::for_project(c),
            role: identity::build_project(c.qualified("build-role"))?,
            cluster_admin: true,
        })
    }
}

/// Convenience: synthesize a graph straight from a config
pub fn synthesize(config: &TopologyConfig) -> Result<ResourceGraph> {
    TopologySynthesizer::new(config.clone())?.synthesize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ResourceId, ResourceKind};

    fn graph() -> ResourceGraph {
        synthesize(&TopologyConfig::new("payments-poc", "us-east-1"))
            .expect("default config should synthesize")
    }

    fn position(order: &[ResourceId], kind: ResourceKind, name: &str) -> usize {
        order
            .iter()
            .position(|id| id.kind == kind && id.name == name)
            .unwrap_or_else(|| panic!("{kind}/{name} missing from plan"))
    }

    #[test]
    fn synthesizes_full_topology() {
        let graph = graph();
        assert_eq!(graph.len(), 19);
        // One record per kind bucket is exercised somewhere.
        let kinds: std::collections::BTreeSet<_> =
            graph.resources().map(|(id, _)| id.kind).collect();
        assert_eq!(kinds.len(), 9);
    }

    #[test]
    fn plan_orders_infrastructure_before_workload() {
        let order = graph().plan().unwrap();

        let vpc = position(&order, ResourceKind::Network, "payments-poc-vpc");
        let cluster = position(&order, ResourceKind::Cluster, "payments-poc-eks");
        let namespace = position(&order, ResourceKind::Manifest, "namespace/payments-poc");
        let config = position(
            &order,
            ResourceKind::Manifest,
            "configmap/cwagentconfig-sidecar",
        );
        let app = position(&order, ResourceKind::Manifest, "deployment/payments-poc");
        let service = position(
            &order,
            ResourceKind::Manifest,
            "service/payments-poc-service",
        );
        let ingress = position(
            &order,
            ResourceKind::Manifest,
            "ingress/payments-poc-ingress",
        );

        assert!(vpc < cluster);
        assert!(cluster < namespace);
        assert!(namespace < config);
        assert!(config < app);
        assert!(app < service);
        assert!(service < ingress);
    }

    #[test]
    fn plan_orders_pipeline_after_its_inputs() {
        let order = graph().plan().unwrap();

        let source = position(&order, ResourceKind::SourceRepository, "payments-poc");
        let registry = position(&order, ResourceKind::RegistryRepository, "payments-poc");
        let cluster = position(&order, ResourceKind::Cluster, "payments-poc-eks");
        let build = position(&order, ResourceKind::BuildProject, "payments-poc-build");
        let trigger = position(&order, ResourceKind::CommitTrigger, "payments-poc-trigger");

        assert!(source < build);
        assert!(registry < build);
        assert!(cluster < build);
        assert!(build < trigger);
    }

    #[test]
    fn controller_args_are_late_bound() {
        let graph = graph();
        let id = ResourceId::new(
            ResourceKind::Manifest,
            "deployment/alb-ingress-controller",
        );
        let ResourceRecord::Manifest(Manifest::Deployment(controller)) =
            graph.get(&id).unwrap()
        else {
            panic!("controller deployment missing");
        };

        let args = controller.spec.template.spec.containers[0]
            .args
            .as_ref()
            .unwrap();
        assert!(args.contains(&"--cluster-name=${cluster.name}".to_string()));
        assert!(args.contains(&"--aws-vpc-id=${vpc.id}".to_string()));
        assert!(args.contains(&"--aws-region=${region}".to_string()));
    }

    #[test]
    fn service_maps_public_port_to_container_port() {
        let graph = graph();
        let id = ResourceId::new(ResourceKind::Manifest, "service/payments-poc-service");
        let ResourceRecord::Manifest(Manifest::Service(service)) = graph.get(&id).unwrap() else {
            panic!("service missing");
        };

        assert_eq!(service.spec.ports[0].port, 80);
        assert_eq!(service.spec.ports[0].target_port, Some(8080));
        assert_eq!(service.spec.type_.as_deref(), Some("NodePort"));
    }

    #[test]
    fn ingress_routes_everything_to_the_service() {
        let graph = graph();
        let id = ResourceId::new(ResourceKind::Manifest, "ingress/payments-poc-ingress");
        let ResourceRecord::Manifest(Manifest::Ingress(ingress)) = graph.get(&id).unwrap() else {
            panic!("ingress missing");
        };

        let annotations = &ingress.metadata.annotations;
        assert_eq!(
            annotations.get("kubernetes.io/ingress.class").map(String::as_str),
            Some("alb")
        );
        assert_eq!(
            annotations
                .get("alb.ingress.kubernetes.io/healthcheck-path")
                .map(String::as_str),
            Some("/actuator/health")
        );

        let path = &ingress.spec.rules[0].http.paths[0];
        assert_eq!(path.path, "/*");
        assert_eq!(path.backend.service_name, "payments-poc-service");
        assert_eq!(path.backend.service_port, 80);
    }

    #[test]
    fn workload_carries_metrics_sidecar() {
        let graph = graph();
        let id = ResourceId::new(ResourceKind::Manifest, "deployment/payments-poc");
        let ResourceRecord::Manifest(Manifest::Deployment(workload)) = graph.get(&id).unwrap()
        else {
            panic!("workload deployment missing");
        };

        let containers = &workload.spec.template.spec.containers;
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].image, "${repository.uri}:latest");
        assert_eq!(containers[1].name, "cloudwatch-agent");
        assert_eq!(
            containers[1].volume_mounts[0].mount_path,
            "/etc/cwagentconfig"
        );
        assert_eq!(workload.spec.replicas, Some(3));
    }

    #[test]
    fn build_project_is_wired_to_cluster_and_registry() {
        let graph = graph();
        let id = ResourceId::new(ResourceKind::BuildProject, "payments-poc-build");
        let ResourceRecord::BuildProject(build) = graph.get(&id).unwrap() else {
            panic!("build project missing");
        };

        assert!(build.privileged);
        assert!(build.cluster_admin);
        assert!(build
            .environment
            .contains(&("CLUSTER_NAME".to_string(), "${cluster.name}".to_string())));
        assert!(build
            .environment
            .contains(&("ECR_REPO_URI".to_string(), "${repository.uri}".to_string())));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let config = TopologyConfig::new("payments-poc", "us-east-1");
        let first = synthesize(&config).unwrap().plan().unwrap();
        let second = synthesize(&config).unwrap().plan().unwrap();
        assert_eq!(first, second);
    }
}
