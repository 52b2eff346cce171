// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use grov_adapters::AdapterRegistry;
use grov_analyzers::{Analyzers, HttpAnalyzers, MockAnalyzers};
use grov_core::{CoreState, ExtendedCache};
use grov_memory::{HttpMemoryService, MemoryService, MockMemoryService};
use grov_store::SqliteStore;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ShowConfig { config } => {
            let config = grov_config::load(config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Start { config, debug } => {
            init_logging(debug);
            match run(config.as_deref()).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::error!(error = %e, "grov exited with an error");
                    std::process::exit(1);
                }
            }
        }
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Arc::new(grov_config::load(config_path)?);

    let store = Arc::new(SqliteStore::open(&config.store.path).await?);
    let adapters = Arc::new(AdapterRegistry::with_builtin_adapters());

    let memory: Arc<dyn MemoryService> = match &config.memory.base_url {
        Some(base_url) => Arc::new(HttpMemoryService::new(base_url.clone(), Duration::from_secs(config.memory.timeout_secs))),
        None => {
            tracing::warn!("no memory.base_url configured, using the built-in mock memory service");
            Arc::new(MockMemoryService::new(vec![]))
        }
    };

    let analyzers: Arc<dyn Analyzers> = match &config.analyzer.base_url {
        Some(base_url) => Arc::new(HttpAnalyzers::new(base_url.clone(), Duration::from_secs(config.analyzer.timeout_secs))),
        None => {
            tracing::warn!("no analyzer.base_url configured, using the built-in mock analyzers");
            Arc::new(MockAnalyzers::new())
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.upstream.timeout_secs))
        .build()?;

    let extended_cache = Arc::new(ExtendedCache::new(http_client.clone()));
    let core = Arc::new(CoreState::new(store, memory, analyzers, extended_cache, config.session.drift_check_interval));

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(());
    });

    grov_server::serve(config, adapters, core, http_client, shutdown_rx).await
}
