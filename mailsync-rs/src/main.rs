use clap::Parser;
use mailsync_rs::config::Config;
use mailsync_rs::error::SyncError;
use mailsync_rs::storage::MessageStore;
use mailsync_rs::sync::{SyncEngine, SyncOptions};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Synchronize one mail account's recent messages into the CRM store.
#[derive(Parser, Debug)]
#[command(name = "mailsync", version)]
struct Args {
    /// Account id to synchronize
    account_id: i64,

    /// Use the full lookback window for every folder
    #[arg(long)]
    full_resync: bool,

    /// Suppress the user-visible summary (logs only)
    #[arg(long)]
    silent: bool,

    /// Print the run report as JSON instead of the text summary
    #[arg(long)]
    json: bool,

    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Starting mailsync");
    info!("  Account: {}", args.account_id);
    info!("  Database: {}", config.storage.database_url);
    if args.full_resync {
        info!("  Full resync requested");
    }

    let store = MessageStore::new(&config.storage.database_url).await?;
    let engine = SyncEngine::new(store, config.sync);
    let options = SyncOptions {
        full_resync: args.full_resync,
        silent: args.silent,
    };

    match engine.sync_account(args.account_id, &options).await {
        Ok(report) => {
            info!("Inserted {} new messages", report.inserted);
            if !args.silent {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!("Synced folders: {}", report.folders_synced.join(", "));
                    for summary in &report.folder_totals {
                        println!("  {}: {} messages on server", summary.folder, summary.observed);
                    }
                    println!("New messages inserted: {}", report.inserted);
                    for warning in &report.warnings {
                        println!("warning: {}", warning);
                    }
                }
            }
            Ok(())
        }
        Err(SyncError::Auth(diag)) => {
            error!("Authentication failed for {} on {}", diag.username, diag.host);
            eprintln!("Authentication failed");
            eprintln!("  host:          {}", diag.host);
            eprintln!("  user:          {}", diag.username);
            eprintln!("  capability:    {}", diag.capability);
            eprintln!("  last response: {}", diag.last_response);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            eprintln!("Sync failed: {}", e);
            std::process::exit(1);
        }
    }
}
