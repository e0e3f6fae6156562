//! shelf - offline-first core of a digital library storefront.
//!
//! Wires the local store, the sync engine and the interception worker
//! together behind a small operator CLI. The interesting machinery lives
//! in the workspace crates; this binary only assembles it.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use shelf_config::Config;
use shelf_gateway::{Gateway, GatewayConfig as WorkerConfig, HttpFetcher};
use shelf_remote::HttpRemote;
use shelf_store::models::Mutation;
use shelf_store::{Database, Repository};
use shelf_sync::{RetryPolicy, Submission, SyncEngine, SyncOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Flatten an `exn` error tree into a terminal-friendly report.
fn render(err: impl std::fmt::Debug) -> miette::Report {
    miette::miette!("{err:?}")
}

async fn open_store(config: &Config) -> miette::Result<(Database, Repository)> {
    let db = Database::connect(&config.store.path).await.map_err(render)?;
    let repo = Repository::from(&db);
    Ok((db, repo))
}

fn build_engine(config: &Config, repo: Repository) -> miette::Result<SyncEngine> {
    let remote = HttpRemote::new(
        config.remote.base().map_err(render)?,
        config.remote.api_key.clone(),
        config.remote.timeout(),
    )
    .map_err(render)?;
    let options = SyncOptions {
        deadline: config.sync.deadline(),
        retry: RetryPolicy {
            max_retries: config.sync.max_retries,
            base_delay: Duration::from_millis(config.sync.base_delay_ms),
            max_delay: Duration::from_millis(config.sync.max_delay_ms),
        },
    };
    Ok(SyncEngine::new(repo, Arc::new(remote), options))
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = Config::load().map_err(render)?;

    match cli.command {
        Command::Library { user_id, json } => {
            let (_db, repo) = open_store(&config).await?;
            let engine = build_engine(&config, repo)?;
            let view = engine.fetch_library(&user_id).await.map_err(render)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view.records).map_err(render)?);
                return Ok(());
            }
            if view.is_offline() {
                println!("offline, {}/{} available", view.available_offline(), view.total());
            } else {
                println!("online, {} in library", view.total());
            }
            for record in &view.records {
                let title = record
                    .book
                    .as_ref()
                    .map(|b| format!("{} - {}", b.author, b.title))
                    .unwrap_or_else(|| record.entry.book_id.clone());
                let marker = if record.entry.downloaded { "↓" } else { " " };
                println!("  {marker} {title} [{}]", record.entry.sync_status);
            }
        },
        Command::Sync => {
            let (_db, repo) = open_store(&config).await?;
            let engine = build_engine(&config, repo)?;
            let report = engine.drain().await.map_err(render)?;
            println!(
                "replayed {}, rejected {}, remaining {}",
                report.replayed, report.rejected, report.remaining,
            );
        },
        Command::Redeem { user_id, book_id, code } => {
            let (_db, repo) = open_store(&config).await?;
            let engine = build_engine(&config, repo)?;
            let outcome = engine
                .submit(Mutation::RedeemCode { user_id, book_id, code })
                .await
                .map_err(render)?;
            match outcome {
                Submission::Applied => println!("code redeemed"),
                Submission::Rejected(message) => println!("redemption refused: {message}"),
                Submission::Queued(id) => println!("offline: redemption queued (#{id})"),
            }
        },
        Command::Size { book_id } => {
            let (_db, repo) = open_store(&config).await?;
            let size = repo.file_size(&book_id).await.map_err(render)?;
            println!("{size} bytes downloaded");
        },
        Command::Serve => {
            let fetcher = HttpFetcher::new(config.remote.timeout()).map_err(render)?;
            let worker = Gateway::new(
                WorkerConfig {
                    backend_origin: config.remote.base().map_err(render)?,
                    shell: config.gateway.shell_urls().map_err(render)?,
                    generation: config.gateway.generation.clone(),
                    cache_root: config.gateway.cache_root.clone(),
                },
                Arc::new(fetcher),
            )
            .await
            .map_err(render)?;
            let (handle, task) = worker.spawn();
            info!(generation = %config.gateway.generation, "interception worker running, ctrl-c to stop");
            tokio::signal::ctrl_c().await.map_err(render)?;
            drop(handle);
            task.await.map_err(render)?;
        },
    }
    Ok(())
}
