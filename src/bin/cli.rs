//! One-shot transactional CLI
//!
//! Each invocation runs a single transaction through the client library:
//! begin, the requested operation, commit. Useful for poking a running
//! cluster and for demonstrating the two disciplines from a shell.

use clap::{Parser, Subcommand, ValueEnum};
use duokv::{Client, Mode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "duokv")]
#[command(about = "duokv transactional key-value CLI")]
#[command(version)]
struct Cli {
    /// Coordinator gRPC endpoint
    #[arg(long, default_value = "http://localhost:5001")]
    coordinator: String,

    /// Data node gRPC endpoints in shard order (comma-separated)
    #[arg(long, value_delimiter = ',', default_value = "http://localhost:7001")]
    nodes: Vec<String>,

    /// Concurrency-control discipline
    #[arg(long, value_enum, default_value = "occ")]
    mode: ModeArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Occ,
    S2pl,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Occ => Mode::Occ,
            ModeArg::S2pl => Mode::S2pl,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Read a key
    Get {
        /// Key
        key: String,
    },

    /// Write a key
    Put {
        /// Key
        key: String,

        /// Value
        value: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client = Client::connect(cli.coordinator.clone(), cli.nodes.clone()).await?;
    let mut txn = client.begin(cli.mode.into()).await?;

    match cli.command {
        Commands::Get { key } => {
            let value = txn.read(&key).await?;
            let ts = txn.commit().await?;
            match value {
                Some(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                None => println!("(missing)"),
            }
            eprintln!("committed at ts {}", ts);
        }
        Commands::Put { key, value } => {
            txn.write(&key, value.into_bytes()).await?;
            let ts = txn.commit().await?;
            eprintln!("committed at ts {}", ts);
        }
    }

    Ok(())
}
