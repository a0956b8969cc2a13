use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mc_store::{new_store, SyncPolicy, SyncedStore};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;
mod utils;

use config::{Cli, ServerConfig};

fn init_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer())
		.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_logging();

	let config = ServerConfig::resolve(Cli::parse()).context("failed to load configuration")?;

	info!(
		address = %config.address,
		driver = %config.driver,
		store_interval_secs = config.store_interval.as_secs(),
		restore = config.restore,
		"Starting metrics collector"
	);

	let store = Arc::new(
		SyncedStore::start(
			new_store(config.driver, &config.location),
			SyncPolicy::from_interval(config.store_interval),
			config.restore,
		)
		.await
		.context("failed to open metric store")?,
	);

	let listener = TcpListener::bind(&config.address)
		.await
		.with_context(|| format!("failed to bind to {}", config.address))?;

	info!("Listening on http://{}", listener.local_addr()?);

	let served = axum::serve(listener, api::router(Arc::clone(&store)))
		.with_graceful_shutdown(utils::shutdown_signal())
		.await;

	info!("Server is shutting down...");

	store
		.shutdown()
		.await
		.context("failed to close metric store")?;

	served.context("HTTP server failed")
}
