//! Lineage CLI
//!
//! Read-only graph queries against a lineage database.
//!
//! # Usage
//!
//! ```bash
//! lineage-cli --db records.db stats
//! lineage-cli --db records.db lineage 3f2c... --depth 3
//! lineage-cli --config lineage.yaml graph 3f2c... --direction both
//! lineage-cli --db records.db combined 3f2c... 9a41...
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doc_lineage::config::{LineageConfig, StoreBackend};
use doc_lineage::{LineageService, TraversalDirection};

#[derive(Parser)]
#[command(name = "lineage-cli")]
#[command(about = "Document lineage and provenance queries", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database (overrides the configured backend)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record counts
    Stats,

    /// Documents reachable along outgoing relationships
    Lineage {
        document_id: String,

        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Documents reachable along incoming relationships
    Provenance {
        document_id: String,

        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Graph from one root in any direction
    Graph {
        document_id: String,

        #[arg(short, long)]
        depth: Option<usize>,

        /// outgoing, incoming or both
        #[arg(long, default_value = "both")]
        direction: TraversalDirection,
    },

    /// Combined shallow graph over several roots
    Combined {
        #[arg(required = true)]
        document_ids: Vec<String>,
    },
}

fn load_config(cli: &Cli) -> Result<LineageConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => LineageConfig::from_yaml(path)?,
        None => LineageConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.storage.backend = StoreBackend::Sqlite;
        config.storage.sqlite_path = Some(db.clone());
    }
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let service = LineageService::from_config(config)?;

    match cli.command {
        Commands::Stats => print_json(&service.stats().await?)?,
        Commands::Lineage { document_id, depth } => {
            print_json(&service.get_lineage(&document_id, depth)?)?
        }
        Commands::Provenance { document_id, depth } => {
            print_json(&service.get_provenance(&document_id, depth)?)?
        }
        Commands::Graph {
            document_id,
            depth,
            direction,
        } => print_json(&service.build_graph(&document_id, depth, direction)?)?,
        Commands::Combined { document_ids } => {
            print_json(&service.build_combined_graph(&document_ids)?)?
        }
    }

    Ok(())
}
