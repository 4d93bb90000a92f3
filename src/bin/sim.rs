//! Allocation simulator binary
//!
//! Replays a cluster scenario through the allocation engine, acting as an
//! instant recovery collaborator, and prints the resulting routing table.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use shardroute::cluster::{ClusterSnapshot, NodeDescriptor, NodeSet, ReplicationConfig};
use shardroute::common::AllocationSettings;
use shardroute::routing::ShardState;
use shardroute::AllocationEngine;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardroute-sim")]
#[command(about = "Replay shard allocation scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reroute/start rounds until the routing table settles
    Run {
        /// Scenario file (TOML)
        #[arg(long)]
        scenario: PathBuf,

        /// Give up after this many rounds
        #[arg(long, default_value = "100")]
        max_rounds: usize,

        /// Override node_concurrent_recoveries
        #[arg(long)]
        recoveries: Option<usize>,
    },
}

/// Scenario file layout
#[derive(Debug, Deserialize)]
struct Scenario {
    #[serde(default)]
    allocation: AllocationSettings,
    nodes: Vec<NodeDescriptor>,
    indices: Vec<IndexSpec>,
}

#[derive(Debug, Deserialize)]
struct IndexSpec {
    name: String,
    shards: u32,
    #[serde(default)]
    replicas: u32,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            max_rounds,
            recoveries,
        } => {
            let scenario: Scenario = config::Config::builder()
                .add_source(config::File::from(scenario.as_path()))
                .build()?
                .try_deserialize()?;

            let mut settings = scenario.allocation;
            if let Some(limit) = recoveries {
                settings.node_concurrent_recoveries = limit;
            }
            settings.validate()?;
            let engine = AllocationEngine::new(settings);

            let mut nodes = NodeSet::builder(&NodeSet::empty());
            for node in scenario.nodes {
                nodes.add(node);
            }
            let mut snapshot = ClusterSnapshot::empty().with_nodes(nodes.build());
            for index in &scenario.indices {
                let config = ReplicationConfig::new(index.shards, index.replicas);
                snapshot = snapshot.create_index(&index.name, config)?;
            }

            snapshot = engine.reroute(&snapshot).apply_to(&snapshot);
            let mut rounds = 0;
            while rounds < max_rounds {
                let recovering: Vec<_> = snapshot
                    .routing_table()
                    .copies()
                    .filter(|c| {
                        matches!(c.state(), ShardState::Initializing | ShardState::Relocating)
                    })
                    .map(|c| c.id())
                    .collect();
                let result = engine.apply_started(&snapshot, &recovering);
                if !result.changed {
                    break;
                }
                snapshot = result.apply_to(&snapshot);
                rounds += 1;
            }

            let table = snapshot.routing_table();
            tracing::info!(
                "Settled after {} rounds: {} started, {} unassigned (routing version {})",
                rounds,
                table.copies_with_state(ShardState::Started).len(),
                table.unassigned_count(),
                table.version()
            );
            println!("{}", serde_json::to_string_pretty(table.as_ref())?);
        }
    }

    Ok(())
}
