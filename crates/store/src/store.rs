use async_trait::async_trait;

use crate::{
	error::Error,
	metric::{MetricKind, MetricValue, Snapshot},
};

/// The contract every backend fulfils.
///
/// `open` must be called exactly once before anything else. After `close`
/// the store must not be mutated again.
#[async_trait]
pub trait MetricStore: Send + Sync + 'static {
	/// Allocates the backend's resources
	async fn open(&self) -> Result<(), Error>;

	/// Releases the backend's resources
	async fn close(&self) -> Result<(), Error>;

	/// Cheap liveness probe
	async fn ping(&self) -> Result<(), Error>;

	/// Parses `value` according to `kind` and applies it to a single entry:
	/// counters are added to, gauges are replaced.
	async fn update(&self, kind: &str, name: &str, value: &str) -> Result<(), Error>;

	/// Current value of an entry, formatted as text
	async fn get(&self, kind: &str, name: &str) -> Result<String, Error>;

	/// Applies counter deltas and gauge values of `batch` as one unit, as seen
	/// by [`MetricStore::get_all`] and concurrent calls to this method.
	async fn update_all(&self, batch: &Snapshot) -> Result<(), Error>;

	/// Every entry currently held
	async fn get_all(&self) -> Result<Snapshot, Error>;

	/// Persists the current state to the backend's durable medium, if any
	async fn save(&self) -> Result<(), Error>;

	/// Replaces the current state with the persisted one, if any
	async fn restore(&self) -> Result<(), Error>;
}

/// Parses the text form of a single update, shared by every backend so that
/// invalid input is rejected before anything is touched.
pub(crate) fn parse_update(kind: &str, value: &str) -> Result<(MetricKind, MetricValue), Error> {
	let kind = MetricKind::parse(kind)?;
	Ok((kind, MetricValue::parse(kind, value)?))
}
