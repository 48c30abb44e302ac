//! Data node binary

use clap::{Parser, Subcommand};
use duokv::{common::NodeConfig, DataNode};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "duokv-node")]
#[command(about = "duokv data node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start data node server
    Serve {
        /// Which shard of the key space this node owns
        #[arg(long)]
        index: u32,

        /// Bind address for HTTP status API
        #[arg(long, default_value = "0.0.0.0:7000")]
        bind: String,

        /// Bind address for gRPC
        #[arg(long, default_value = "0.0.0.0:7001")]
        grpc: String,

        /// Store buckets
        #[arg(long, default_value = "64")]
        buckets: usize,

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
            index,
            bind,
            grpc,
            buckets,
            config,
        } => {
            let node_config = match config {
                Some(path) => {
                    let file = duokv::Config::from_file(&path)?;
                    file.validate()?;
                    file.node
                        .ok_or_else(|| anyhow::anyhow!("{} has no node section", path.display()))?
                }
                None => NodeConfig {
                    bind_addr: bind.parse()?,
                    grpc_addr: grpc.parse()?,
                    node_index: index,
                    num_buckets: buckets,
                    ..Default::default()
                },
            };

            DataNode::new(node_config).serve().await?;
        }
    }

    Ok(())
}
