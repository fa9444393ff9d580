//! Failover orchestrator operator CLI.
//!
//! Drives the control API over HTTP rather than linking the orchestrator
//! library directly, so the API remains the single source of truth.
//!
//! ```bash
//! failover-cli status
//! failover-cli trigger b --dry-run
//! failover-cli trigger b
//! failover-cli history --limit 20
//! ```

use clap::{Parser, Subcommand};
use serde::Deserialize;

mod client;

use client::ApiClient;

#[derive(Parser)]
#[command(name = "failover-cli")]
#[command(version)]
#[command(about = "Operator CLI for the multi-region failover orchestrator", long_about = None)]
struct Cli {
    /// Base URL of the control API.
    #[arg(long, env = "FAILOVER_API_URL", default_value = "http://127.0.0.1:8080")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a failover to the given target region.
    Trigger {
        target_region: String,
        /// Report what the trigger would do without calling it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show current routing status.
    Status,
    /// List recent failover attempts.
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show aggregate metrics.
    Metrics,
    /// Check orchestrator health.
    Health,
}

#[derive(Deserialize)]
struct StatusResponse {
    active_region: String,
    version: u64,
    in_flight: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let client = ApiClient::new(cli.api_url);

    let result = match cli.command {
        Commands::Trigger { target_region, dry_run } => trigger(&client, &target_region, dry_run).await,
        Commands::Status => status(&client).await,
        Commands::History { limit } => history(&client, limit).await,
        Commands::Metrics => metrics(&client).await,
        Commands::Health => health(&client).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn trigger(client: &ApiClient, target_region: &str, dry_run: bool) -> Result<(), String> {
    if dry_run {
        let current: StatusResponse = client.get("/status").await?;
        if current.in_flight {
            println!("would reject: already_in_progress");
        } else if current.active_region == target_region {
            println!("would reject: already_at_target");
        } else {
            println!(
                "would trigger failover: {} -> {target_region} (version {})",
                current.active_region, current.version
            );
        }
        return Ok(());
    }

    let record: serde_json::Value = client.post(&format!("/failover/{target_region}")).await?;
    println!("{}", serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?);
    Ok(())
}

async fn status(client: &ApiClient) -> Result<(), String> {
    let body: serde_json::Value = client.get("/status").await?;
    println!("{}", serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?);
    Ok(())
}

async fn history(client: &ApiClient, limit: Option<usize>) -> Result<(), String> {
    let path = match limit {
        Some(n) => format!("/history?limit={n}"),
        None => "/history".to_string(),
    };
    let body: serde_json::Value = client.get(&path).await?;
    println!("{}", serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?);
    Ok(())
}

async fn metrics(client: &ApiClient) -> Result<(), String> {
    let body: serde_json::Value = client.get("/metrics").await?;
    println!("{}", serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?);
    Ok(())
}

async fn health(client: &ApiClient) -> Result<(), String> {
    let body: serde_json::Value = client.get("/health").await?;
    println!("{}", serde_json::to_string_pretty(&body).map_err(|e| e.to_string())?);
    Ok(())
}
