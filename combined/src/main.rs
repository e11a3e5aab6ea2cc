//! Demo binary for the table store unit of work.

mod demo;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use common::LogConfig;
use table_store::TableStoreConfig;

#[derive(Parser)]
#[command(name = "table-demo")]
#[command(about = "Unit of work and audit trail demo over the table store")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert, update and delete a book, each in its own unit of work
    Demo {
        /// Publisher the book is filed under
        #[arg(long, default_value = "ABPress")]
        publisher: String,
        /// Roll back the delete instead of committing it
        #[arg(long)]
        rollback_delete: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize tracing
    let log = LogConfig::from_env();
    let filter = if cli.verbose {
        EnvFilter::new(log.fallback_directive(true))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| log.fallback_directive(false).into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TableStoreConfig::from_env();
    info!(storage = ?config.storage, actor = ?config.actor, "Configuration loaded");

    match cli.command {
        Commands::Demo {
            publisher,
            rollback_delete,
        } => {
            let client = table_store::connect(&config.storage)?;
            if let Err(e) = demo::run(client, &config, &publisher, rollback_delete).await {
                error!("Demo failed: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}
