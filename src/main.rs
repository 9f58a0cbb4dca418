//! graft: pull relationally-linked CMS collections into a local node graph.

use clap::{Parser, Subcommand};
use exn::{Exn, ResultExt};
use futures::StreamExt;
use graft_assets::{AssetCache, HttpDownloader};
use graft_config::Settings;
use graft_graph::JsonDirStore;
use graft_pipeline::{SyncEvent, SyncRun};
use graft_source::{DirectusClient, SourceHandle};
use std::path::PathBuf;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "graft", version, about)]
struct Cli {
    /// Log debug output (overridden by `RUST_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize every configured collection into the output directory
    Sync {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(short, long, env = "GRAFT_CONFIG")]
        config: Option<PathBuf>,

        /// Output directory, overriding the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load and validate the configuration without contacting the remote
    Check {
        /// Configuration file (YAML, TOML or JSON)
        #[arg(short, long, env = "GRAFT_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
enum CliError {
    #[display("configuration could not be loaded")]
    Config,
    #[display("could not connect to the remote")]
    Connect,
    #[display("could not set up the asset cache")]
    Assets,
    #[display("synchronization failed")]
    Sync,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let result = match cli.command {
        Commands::Sync { config, output } => sync(config, output).await,
        Commands::Check { config } => check(config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

fn check(config: Option<PathBuf>) -> Result<(), Exn<CliError>> {
    let settings = graft_config::load(config.as_deref()).or_raise(|| CliError::Config)?;
    for collection in &settings.collections {
        println!("{} <- {} ({} reference rules)", collection.name, collection.remote(), collection.refs.len());
    }
    println!("Configuration OK");
    Ok(())
}

async fn sync(config: Option<PathBuf>, output: Option<PathBuf>) -> Result<(), Exn<CliError>> {
    let settings: Settings = graft_config::load(config.as_deref()).or_raise(|| CliError::Config)?;
    let output = output.unwrap_or_else(|| settings.output.clone());

    let source = DirectusClient::connect(settings.api_url.clone(), &settings.auth, settings.connect_timeout())
        .await
        .or_raise(|| CliError::Connect)?;
    let source: SourceHandle = Arc::new(source);

    let layout = settings.assets.layout().or_raise(|| CliError::Assets)?;
    let downloader = HttpDownloader::new(settings.connect_timeout()).or_raise(|| CliError::Assets)?;
    let mut cache = AssetCache::new(layout, Arc::new(downloader));
    if let Some(token) = source.token() {
        cache = cache.with_token(token);
    }

    let run = SyncRun::from_settings(source, &settings).with_assets(cache);
    let mut store = JsonDirStore::new(&output);
    let result = report(&run, &mut store).await;
    run.logout().await;
    result?;
    tracing::info!(output = %output.display(), "Nodes written");
    Ok(())
}

async fn report(run: &SyncRun, store: &mut JsonDirStore) -> Result<(), Exn<CliError>> {
    let mut events = pin!(run.run(store));
    while let Some(event) = events.next().await {
        match event.or_raise(|| CliError::Sync)? {
            SyncEvent::CollectionLoaded { collection, records, assets } => {
                println!("{collection}: {records} records, {assets} assets");
            },
            SyncEvent::Resolved(stats) => {
                println!("references: {} edges, {} inverse, {} dropped", stats.edges, stats.inverse_edges, stats.dropped);
            },
            SyncEvent::Assembled(nodes) => println!("{nodes} nodes assembled"),
            SyncEvent::Started | SyncEvent::SchemaDeclared { .. } | SyncEvent::Complete => {},
        }
    }
    Ok(())
}
