//! Keeps a store's durable medium in step with its in-memory state, either
//! after every mutation or on a fixed period.

use std::{sync::Arc, time::Duration};

use mc_utils::error::report_error;
use tokio::{
	select, spawn,
	sync::Mutex,
	task::JoinHandle,
	time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{error::Error, metric::Snapshot, store::MetricStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
	/// Save right after every successful mutation
	Synchronous,
	/// Save on a fixed period, regardless of traffic
	Periodic(Duration),
}

impl SyncPolicy {
	/// A zero interval selects synchronous mode
	pub fn from_interval(interval: Duration) -> Self {
		if interval.is_zero() {
			Self::Synchronous
		} else {
			Self::Periodic(interval)
		}
	}
}

/// A store wrapped with its save/restore lifecycle.
///
/// Mutations go through this type so synchronous mode can save after them;
/// reads are plain delegations.
pub struct SyncedStore {
	store: Arc<dyn MetricStore>,
	policy: SyncPolicy,
	cancel: CancellationToken,
	periodic: Mutex<Option<JoinHandle<()>>>,
}

impl SyncedStore {
	/// Opens `store`, restores it when asked to and starts the periodic saver.
	///
	/// Failing to open is fatal; failing to restore only leaves the store empty.
	pub async fn start(
		store: Arc<dyn MetricStore>,
		policy: SyncPolicy,
		restore: bool,
	) -> Result<Self, Error> {
		store.open().await?;

		if restore {
			if let Err(e) = store.restore().await {
				warn!("Failed to restore metrics, starting empty: {e:#}");
			}
		}

		let cancel = CancellationToken::new();

		let periodic = match policy {
			SyncPolicy::Periodic(period) => Some(spawn(run_periodic(
				Arc::clone(&store),
				period,
				cancel.child_token(),
			))),
			SyncPolicy::Synchronous => None,
		};

		info!(?policy, restore, "Metric store started");

		Ok(Self {
			store,
			policy,
			cancel,
			periodic: Mutex::new(periodic),
		})
	}

	pub fn policy(&self) -> SyncPolicy {
		self.policy
	}

	pub fn store(&self) -> &Arc<dyn MetricStore> {
		&self.store
	}

	pub async fn ping(&self) -> Result<(), Error> {
		self.store.ping().await
	}

	pub async fn get(&self, kind: &str, name: &str) -> Result<String, Error> {
		self.store.get(kind, name).await
	}

	pub async fn get_all(&self) -> Result<Snapshot, Error> {
		self.store.get_all().await
	}

	pub async fn update(&self, kind: &str, name: &str, value: &str) -> Result<(), Error> {
		self.store.update(kind, name, value).await?;
		self.after_mutation().await;

		Ok(())
	}

	pub async fn update_all(&self, batch: &Snapshot) -> Result<(), Error> {
		if batch.is_empty() {
			return Ok(());
		}

		self.store.update_all(batch).await?;
		self.after_mutation().await;

		Ok(())
	}

	async fn after_mutation(&self) {
		if self.policy == SyncPolicy::Synchronous {
			report_error(&self.store.save().await, "Failed to save metrics");
		}
	}

	/// Stops the periodic saver, saves one last time and closes the store.
	///
	/// A failing final save is logged; only closing can fail this call.
	pub async fn shutdown(&self) -> Result<(), Error> {
		self.cancel.cancel();

		if let Some(handle) = self.periodic.lock().await.take() {
			if let Err(e) = handle.await {
				error!("Periodic metric saver failed: {e:#?}");
			}
		}

		report_error(&self.store.save().await, "Failed to save metrics on shutdown");

		self.store.close().await
	}
}

impl Drop for SyncedStore {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// One periodic cycle: an unhealthy store skips the save until the next tick.
async fn sync_once(store: &dyn MetricStore) {
	if let Err(e) = store.ping().await {
		debug!("Metric store unreachable, skipping save: {e:#}");
		return;
	}

	match store.save().await {
		Ok(()) => debug!("Metrics synchronized"),
		Err(e) => error!("Failed to save metrics: {e:#}"),
	}
}

async fn run_periodic(store: Arc<dyn MetricStore>, period: Duration, cancel: CancellationToken) {
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		select! {
			() = cancel.cancelled() => break,
			_ = ticker.tick() => sync_once(&*store).await,
		}
	}

	debug!("Periodic metric saver stopped");
}
