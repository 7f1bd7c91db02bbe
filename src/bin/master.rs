//! Master binary

use blobmaster::common::{format_bytes, MasterConfig};
use blobmaster::sequence::{FileSequenceStore, SequenceStore};
use blobmaster::topology::{spawn_liveness_watchdog, spawn_maintenance};
use blobmaster::Topology;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "blobmaster")]
#[command(about = "Blob storage master: topology, placement and file id sequencing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the master
    Serve {
        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Topology id
        #[arg(long)]
        id: Option<String>,

        /// Metadata directory (holds the sequence file)
        #[arg(long)]
        meta_dir: Option<PathBuf>,

        /// Rack/data center mapping file
        #[arg(long)]
        topology_file: Option<PathBuf>,
    },

    /// Print the persisted sequence high-water mark
    Sequence {
        /// Metadata directory
        #[arg(long, default_value = "./master-data")]
        meta_dir: PathBuf,

        /// Sequence file name inside the metadata directory
        #[arg(long, default_value = "sequence.dat")]
        sequence_file: String,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            id,
            meta_dir,
            topology_file,
        } => {
            // File and environment first, CLI flags have the last word
            let mut master_config = MasterConfig::load(config.as_deref())?;
            if let Some(id) = id {
                master_config.id = id;
            }
            if let Some(meta_dir) = meta_dir {
                master_config.meta_dir = meta_dir;
            }
            if topology_file.is_some() {
                master_config.topology_file = topology_file;
            }
            init_tracing(&master_config.log_level);

            let topo = Arc::new(Topology::from_config(&master_config)?);
            tracing::info!(
                "Master {} ready (volume size limit {}, pulse {}s, sequence at {})",
                topo.id(),
                format_bytes(topo.volume_size_limit()),
                master_config.pulse_seconds,
                topo.sequencer().peek()
            );
            tracing::warn!("No volume allocator configured, volume growth is disabled");

            let maintenance = spawn_maintenance(topo.clone());
            let watchdog = spawn_liveness_watchdog(topo.clone());

            tokio::signal::ctrl_c().await?;
            topo.shutdown();
            watchdog.await?;
            if let Some(maintenance) = maintenance {
                maintenance.await?;
            }
            tracing::info!("Master stopped");
        }
        Commands::Sequence {
            meta_dir,
            sequence_file,
        } => {
            let store = FileSequenceStore::new(meta_dir.join(sequence_file))?;
            match store.load()? {
                Some(ceiling) => println!("{}", ceiling),
                None => println!("no sequence persisted at {}", store.path().display()),
            }
        }
    }

    Ok(())
}
