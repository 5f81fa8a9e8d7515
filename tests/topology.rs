//! End-to-end topology tests: synthesize, plan, apply, converge.

use async_trait::async_trait;
use mockall::Sequence;
use serde_json::Value;

use topograph::config::TopologyConfig;
use topograph::engine::{ApplyEngine, ApplyOutcome, MemoryApi, ProvisioningApi};
use topograph::graph::{ResourceGraph, ResourceId, ResourceKind};
use topograph::identity::INGRESS_STATEMENT_BLOCKS;
use topograph::pipeline::{DeploymentState, PipelineRun};
use topograph::resource::{NetworkSpec, ResourceRecord};
use topograph::{topology, Result};

fn test_config() -> TopologyConfig {
    TopologyConfig::new("payments-poc", "us-east-1")
}

fn synthesized() -> ResourceGraph {
    topology::synthesize(&test_config()).expect("default config should synthesize")
}

async fn applied() -> (ApplyEngine<MemoryApi>, topograph::engine::ApplyReport) {
    let engine = ApplyEngine::new(MemoryApi::new()).expect("engine should build");
    let report = engine
        .apply(&synthesized(), "us-east-1")
        .await
        .expect("apply should converge");
    (engine, report)
}

// Story: an operator synthesizes the default topology and applies it twice.
// The first walk creates every resource in dependency order; the second
// changes nothing.

#[tokio::test]
async fn apply_converges_and_is_idempotent() {
    let (engine, first) = applied().await;
    assert_eq!(first.created(), first.changes.len());

    let second = engine
        .apply(&synthesized(), "us-east-1")
        .await
        .expect("second apply should converge");
    assert!(second.is_converged());
}

#[tokio::test]
async fn every_dependency_is_applied_before_its_dependent() {
    let graph = synthesized();
    let order = graph.plan().expect("graph should plan");

    let position = |id: &ResourceId| order.iter().position(|o| o == id).expect("id in plan");
    for (id, _) in graph.resources() {
        for dep in graph.dependencies_of(id) {
            assert!(
                position(dep) < position(id),
                "{dep} must precede {id} in the plan"
            );
        }
    }
}

// Story: the rendered desired states stored by the API carry no unresolved
// placeholders, and the workload points at the provisioned registry.

#[tokio::test]
async fn rendered_records_reference_provisioned_resources() {
    let (engine, _) = applied().await;

    let workload = engine
        .api()
        .desired_state(&ResourceId::new(
            ResourceKind::Manifest,
            "deployment/payments-poc",
        ))
        .expect("workload deployment stored");
    assert_eq!(
        workload["spec"]["spec"]["template"]["spec"]["containers"][0]["image"],
        "registry.local/payments-poc:latest"
    );

    for id in [
        ResourceId::new(ResourceKind::Manifest, "deployment/alb-ingress-controller"),
        ResourceId::new(ResourceKind::BuildProject, "payments-poc-build"),
    ] {
        let stored = engine.api().desired_state(&id).expect("record stored");
        let rendered = serde_json::to_string(&stored).expect("serializable");
        assert!(!rendered.contains("${"), "{id} still has placeholders");
    }
}

#[tokio::test]
async fn ingress_controller_identity_carries_every_statement_block() {
    let graph = synthesized();
    let id = ResourceId::new(ResourceKind::Role, "alb-ingress-controller");
    let ResourceRecord::Role(role) = graph.get(&id).expect("controller role declared") else {
        panic!("controller identity is not a role");
    };

    assert_eq!(role.policy.len(), INGRESS_STATEMENT_BLOCKS.len());
    for (statement, (sid, actions)) in role.policy.statements().iter().zip(INGRESS_STATEMENT_BLOCKS)
    {
        assert_eq!(statement.sid.as_deref(), Some(*sid));
        assert_eq!(statement.actions.len(), actions.len());
    }
}

#[tokio::test]
async fn public_route_maps_to_the_workload() {
    let (engine, _) = applied().await;

    let service = engine
        .api()
        .desired_state(&ResourceId::new(
            ResourceKind::Manifest,
            "service/payments-poc-service",
        ))
        .expect("service stored");
    assert_eq!(service["spec"]["spec"]["ports"][0]["port"], 80);
    assert_eq!(service["spec"]["spec"]["ports"][0]["targetPort"], 8080);

    let ingress = engine
        .api()
        .desired_state(&ResourceId::new(
            ResourceKind::Manifest,
            "ingress/payments-poc-ingress",
        ))
        .expect("ingress stored");
    let path = &ingress["spec"]["spec"]["rules"][0]["http"]["paths"][0];
    assert_eq!(path["path"], "/*");
    assert_eq!(path["backend"]["serviceName"], "payments-poc-service");
    assert_eq!(path["backend"]["servicePort"], 80);
}

// Story: a commit lands on the tracked branch. The resulting pipeline run
// pushes an image tagged with the commit id and patches the deployment;
// a second commit's run supersedes the first.

#[tokio::test]
async fn commit_runs_patch_the_deployment_with_commit_tags() {
    let (_, report) = applied().await;
    let repository = report
        .outputs
        .source_repository
        .expect("source repository surfaced");
    let uri = format!("registry.local/{repository}");

    let mut deployment = DeploymentState::default();
    PipelineRun::new(&uri, "4f2a91c")
        .expect("run builds")
        .execute(&mut deployment, None)
        .expect("run succeeds");
    PipelineRun::new(&uri, "8b07d3e")
        .expect("run builds")
        .execute(&mut deployment, None)
        .expect("run succeeds");

    assert_eq!(deployment.image, format!("{uri}:8b07d3e"));
}

// Teardown walks the exact reverse of the apply order; the mock enforces
// the call sequence.

mockall::mock! {
    Api {}

    #[async_trait]
    impl ProvisioningApi for Api {
        async fn create_or_update(&self, id: &ResourceId, desired: &Value) -> Result<ApplyOutcome>;
        async fn delete(&self, id: &ResourceId) -> Result<()>;
    }
}

#[tokio::test]
async fn teardown_deletes_in_reverse_dependency_order() {
    let mut graph = ResourceGraph::new();
    let network = |name: &str| {
        ResourceRecord::Network(NetworkSpec {
            name: name.to_string(),
            max_availability_zones: 1,
        })
    };
    let vpc = graph.add(network("vpc")).unwrap();
    let cluster = graph.add(network("cluster")).unwrap();
    let app = graph.add(network("app")).unwrap();
    graph.depends_on(&cluster, &vpc).unwrap();
    graph.depends_on(&app, &cluster).unwrap();

    let mut api = MockApi::new();
    let mut seq = Sequence::new();
    for expected in [app.clone(), cluster.clone(), vpc.clone()] {
        api.expect_delete()
            .withf(move |id| *id == expected)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    let engine = ApplyEngine::new(api).expect("engine should build");
    let order = engine.teardown(&graph).await.expect("teardown succeeds");
    assert_eq!(order, vec![app, cluster, vpc]);
}
