use std::{
	ffi::OsString,
	path::{Path, PathBuf},
};

use async_trait::async_trait;
use mc_utils::error::FileIOError;
use tokio::{
	fs,
	sync::{Mutex, RwLock},
};
use tracing::{debug, error, info, warn};

use crate::{
	error::Error,
	metric::{MetricKind, Snapshot},
	store::{parse_update, MetricStore},
};

/// Keeps every metric in memory, optionally snapshotting them to a JSON file.
///
/// Without a snapshot path `save` and `restore` do nothing and the store is
/// purely ephemeral.
#[derive(Debug, Default)]
pub struct MemoryStore {
	metrics: RwLock<Snapshot>,
	snapshot_path: Option<PathBuf>,
	// Serializes snapshot writers so an older state never overwrites a newer one
	save_lock: Mutex<()>,
}

impl MemoryStore {
	pub fn ephemeral() -> Self {
		Self::default()
	}

	/// An empty path yields an ephemeral store
	pub fn with_snapshot_file(path: impl Into<PathBuf>) -> Self {
		let path = path.into();

		Self {
			snapshot_path: (!path.as_os_str().is_empty()).then_some(path),
			..Default::default()
		}
	}

	pub fn snapshot_path(&self) -> Option<&Path> {
		self.snapshot_path.as_deref()
	}

	async fn write_snapshot(&self, path: &Path) -> Result<(), Error> {
		let _guard = self.save_lock.lock().await;

		let bytes = {
			let metrics = self.metrics.read().await;
			// serde_json writes non-finite floats as `null`, which can't be read back
			metrics.check_gauges()?;
			serde_json::to_vec_pretty(&*metrics)?
		};

		let tmp_path = {
			let mut tmp = OsString::from(path.as_os_str());
			tmp.push(".tmp");
			PathBuf::from(tmp)
		};

		fs::write(&tmp_path, &bytes)
			.await
			.map_err(FileIOError::new("failed to write snapshot", &tmp_path))?;

		fs::rename(&tmp_path, path)
			.await
			.map_err(FileIOError::new("failed to replace snapshot", path))?;

		debug!(path = %path.display(), bytes = bytes.len(), "Snapshot saved");

		Ok(())
	}

	async fn read_snapshot(&self, path: &Path) -> Result<Option<Snapshot>, Error> {
		let bytes = match fs::read(path).await {
			Ok(bytes) => bytes,
			Err(e) => {
				let e = FileIOError::new("failed to read snapshot", path)(e);
				if e.is_not_found() {
					warn!(path = %path.display(), "No snapshot file found, starting empty");
					return Ok(None);
				}
				return Err(e.into());
			}
		};

		if bytes.iter().all(u8::is_ascii_whitespace) {
			warn!(path = %path.display(), "Snapshot file is empty, starting empty");
			return Ok(None);
		}

		match serde_json::from_slice(&bytes) {
			Ok(snapshot) => Ok(Some(snapshot)),
			Err(e) => {
				error!(path = %path.display(), "Corrupt snapshot file, starting empty: {e:#}");
				Ok(None)
			}
		}
	}
}

#[async_trait]
impl MetricStore for MemoryStore {
	async fn open(&self) -> Result<(), Error> {
		*self.metrics.write().await = Snapshot::default();

		info!(
			snapshot = ?self.snapshot_path,
			"Opened in-memory metric store"
		);

		Ok(())
	}

	async fn close(&self) -> Result<(), Error> {
		*self.metrics.write().await = Snapshot::default();

		info!("Closed in-memory metric store");

		Ok(())
	}

	async fn ping(&self) -> Result<(), Error> {
		Ok(())
	}

	async fn update(&self, kind: &str, name: &str, value: &str) -> Result<(), Error> {
		let (_, value) = parse_update(kind, value)?;

		self.metrics.write().await.apply(name, value);

		Ok(())
	}

	async fn get(&self, kind: &str, name: &str) -> Result<String, Error> {
		let kind = MetricKind::parse(kind)?;

		self.metrics
			.read()
			.await
			.get(kind, name)
			.map(|value| value.to_string())
			.ok_or_else(|| Error::NotFound {
				kind,
				name: name.to_string(),
			})
	}

	async fn update_all(&self, batch: &Snapshot) -> Result<(), Error> {
		batch.check_gauges()?;

		self.metrics.write().await.merge(batch);

		Ok(())
	}

	async fn get_all(&self) -> Result<Snapshot, Error> {
		Ok(self.metrics.read().await.clone())
	}

	async fn save(&self) -> Result<(), Error> {
		match &self.snapshot_path {
			Some(path) => self.write_snapshot(path).await,
			None => Ok(()),
		}
	}

	async fn restore(&self) -> Result<(), Error> {
		let Some(path) = &self.snapshot_path else {
			return Ok(());
		};

		if let Some(snapshot) = self.read_snapshot(path).await? {
			info!(
				path = %path.display(),
				counters = snapshot.counters.len(),
				gauges = snapshot.gauges.len(),
				"Restored metrics from snapshot"
			);

			*self.metrics.write().await = snapshot;
		}

		Ok(())
	}
}
