//! Coordinator binary

use clap::{Parser, Subcommand};
use duokv::{common::CoordinatorConfig, Coordinator};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "duokv-coord")]
#[command(about = "duokv transaction coordinator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start coordinator server
    Serve {
        /// Bind address for HTTP status API
        #[arg(long, default_value = "0.0.0.0:5000")]
        bind: String,

        /// Bind address for gRPC
        #[arg(long, default_value = "0.0.0.0:5001")]
        grpc: String,

        /// Data node gRPC endpoints in shard order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        nodes: Vec<String>,

        /// Abort live transactions older than this many milliseconds
        #[arg(long)]
        max_txn_age_ms: Option<u64>,

        /// Config file (overrides the flags above)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            grpc,
            nodes,
            max_txn_age_ms,
            config,
        } => {
            let coord_config = match config {
                Some(path) => {
                    let file = duokv::Config::from_file(&path)?;
                    file.validate()?;
                    file.coordinator.ok_or_else(|| {
                        anyhow::anyhow!("{} has no coordinator section", path.display())
                    })?
                }
                None => {
                    if nodes.is_empty() {
                        anyhow::bail!("--nodes is required (or pass --config)");
                    }
                    CoordinatorConfig {
                        bind_addr: bind.parse()?,
                        grpc_addr: grpc.parse()?,
                        nodes,
                        max_txn_age_ms,
                        ..Default::default()
                    }
                }
            };

            Coordinator::new(coord_config).serve().await?;
        }
    }

    Ok(())
}
