//! Topograph command-line interface

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topograph::config::TopologyConfig;
use topograph::engine::{ApplyEngine, MemoryApi};
use topograph::topology;

#[derive(Parser)]
#[command(name = "topograph", version, about = "Declarative cloud topology synthesizer")]
struct Cli {
    /// Path to the topology config file
    #[arg(
        short = 'f',
        long,
        global = true,
        default_value = "topology.yaml",
        env = "TOPOGRAPH_CONFIG"
    )]
    config: std::path::PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize the resource graph and print every record as YAML
    Synth,
    /// Print the planned apply order
    Plan {
        /// Print the teardown order instead
        #[arg(long)]
        teardown: bool,
    },
    /// Converge the topology against the in-process provisioning API
    Apply {
        /// Plan and render only; submit nothing
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let content = tokio::fs::read_to_string(&cli.config)
        .await
        .with_context(|| format!("reading config {}", cli.config.display()))?;
    let config = TopologyConfig::from_yaml(&content).context("parsing config")?;
    let graph = topology::synthesize(&config).context("synthesizing topology")?;

    match cli.command {
        Command::Synth => {
            for (_, record) in graph.resources() {
                let desired = record.desired_state()?;
                print!("---\n{}", serde_yaml::to_string(&desired)?);
            }
        }
        Command::Plan { teardown } => {
            let order = if teardown {
                graph.teardown_order()?
            } else {
                graph.plan()?
            };
            for (i, id) in order.iter().enumerate() {
                println!("{:>3}. {id}", i + 1);
            }
        }
        Command::Apply { dry_run } => {
            if dry_run {
                let order = graph.plan()?;
                println!("apply would converge {} resources", order.len());
                for id in &order {
                    println!("  {id}");
                }
                return Ok(());
            }

            let engine = ApplyEngine::new(MemoryApi::new())?;
            let report = engine.apply(&graph, &config.region).await?;
            println!(
                "apply complete: {} created, {} updated, {} unchanged",
                report.created(),
                report.updated(),
                report.unchanged()
            );
            if let Some(source) = &report.outputs.source_repository {
                println!("source repository: {source}");
            }
            if let Some(registry) = &report.outputs.registry_repository {
                println!("registry repository: {registry}");
            }
            if let Some(project) = &report.outputs.build_project {
                println!("build project: {project}");
            }
        }
    }

    Ok(())
}
