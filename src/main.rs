mod cli;
mod config;
mod containers;
mod engine;
mod error;
mod fetch;
mod models;
mod output;
mod registry;
mod transform;
mod version;

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::Cli;
use config::{Config, FileConfig};
use containers::{group_by_domain, load_inventory, track_containers};
use fetch::TagFetcher;
use output::{parse_columns, print_results, print_summary};
use registry::RegistryClient;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "contrack=debug" } else { "contrack=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let file_config = FileConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    let config = Config::from_sources(&cli, &file_config);
    init_tracing(config.debug);
    match &file_config.source {
        Some(path) => debug!("Using config file {}", path.display()),
        None => debug!("No config file, using defaults"),
    }

    let columns = parse_columns(&config.columns)?;
    let registries = file_config.registry_map();

    let discovered = match &config.containers {
        Some(path) => load_inventory(path, config.include_stopped)
            .context("Failed to load container inventory")?,
        None => {
            debug!("No container inventory given");
            Vec::new()
        }
    };

    let tracked = track_containers(&discovered, &registries);
    debug!("Number of containers tracked: {}", tracked.len());
    let (groups, unique_images) = group_by_domain(&tracked);

    let client = RegistryClient::new(config.timeout, config.retry, config.max_pages)
        .context("Failed to create HTTP client")?;
    let fetcher = TagFetcher::new(client, config.concurrency, config.deadline);

    let progress = progress_bar(unique_images, config.no_progress);
    let image_tags = fetcher.fetch_all(&groups, &registries, &progress).await;
    progress.finish_and_clear();

    let results = engine::evaluate(&tracked, &image_tags);
    print_results(&results, &columns);
    print_summary(&results);

    Ok(())
}

fn progress_bar(len: usize, hidden: bool) -> ProgressBar {
    if hidden || len == 0 {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("Fetching tags {wide_bar} {pos}/{len}") {
        bar.set_style(style);
    }
    bar
}
