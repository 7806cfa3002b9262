mod db;
mod error;
mod fetch;
mod live;
mod parser;
mod reconcile;
mod server;
mod settings;
mod summary;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use db::{SqliteStore, WorkStore};
use fetch::FetchClient;
use live::LiveCitations;
use settings::Settings;

#[derive(Parser)]
#[command(name = "scholar_citations", about = "Google Scholar citation counts: live total + dataset sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update per-publication citation counts in the dataset from the works listing
    Sync,
    /// Fetch the current total citation count once and print it as JSON
    Total,
    /// Total to display: dataset sum, overlaid with the live count when reachable
    Summary,
    /// Load or refresh publications from a JSON array
    Import {
        /// Path to a JSON file of publications
        path: PathBuf,
    },
    /// Serve the live total over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    tracing::debug!(?settings, "settings loaded");

    let result = match cli.command {
        Commands::Sync => {
            let store = open_store(&settings)?;
            let client = FetchClient::new(&settings)?;
            let outcome = reconcile::reconcile(&client, &store, &settings.listing_url)
                .await
                .context("Citation sync failed")?;
            if outcome.updated_count == 0 {
                println!("No citation updates found.");
            } else {
                println!(
                    "Updated {} citation value(s) in {}.",
                    outcome.updated_count,
                    settings.db_path.display()
                );
            }
            Ok(())
        }
        Commands::Total => {
            let client = FetchClient::new(&settings)?;
            let metric = live::fetch_aggregate(&client, &settings.profile_url)
                .await
                .context("Live citation fetch failed")?;
            println!("{}", serde_json::to_string_pretty(&metric)?);
            Ok(())
        }
        Commands::Summary => {
            let store = open_store(&settings)?;
            let live = LiveCitations::from_settings(FetchClient::new(&settings)?, &settings);
            let summary = summary::citation_summary(&store, &live).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Commands::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let rows: Vec<db::PublicationImport> = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid publication JSON in {}", path.display()))?;
            let store = open_store(&settings)?;
            let written = db::import_publications(store.conn(), &rows)?;
            let total = summary::local_total(&store)?;
            println!(
                "Imported {} publication(s) ({} stored, {} citations).",
                written,
                store.load_citations()?.len(),
                total
            );
            Ok(())
        }
        Commands::Serve => {
            let live = LiveCitations::from_settings(FetchClient::new(&settings)?, &settings);
            server::serve(&settings, live).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("Done in {}", format_duration(elapsed));
    }

    result
}

fn open_store(settings: &Settings) -> anyhow::Result<SqliteStore> {
    if let Some(dir) = settings.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    SqliteStore::open(&settings.db_path)
        .with_context(|| format!("Failed to open dataset {}", settings.db_path.display()))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {}s", secs / 60, secs % 60)
    }
}
