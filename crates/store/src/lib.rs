//! Metric persistence for the collector.
//!
//! Three interchangeable backends implement [`MetricStore`]:
//! - an ephemeral in-memory store,
//! - the same in-memory store snapshotted to a JSON file,
//! - a PostgreSQL store that aggregates inside its upserts.
//!
//! [`new_store`] picks one from configuration and [`SyncedStore`] drives its
//! open/restore/save/close lifecycle.

mod batch;
mod error;
mod factory;
mod memory;
mod metric;
mod postgres;
mod retry;
mod store;
mod sync;

pub use batch::{reconcile, MetricItem};
pub use error::Error;
pub use factory::{new_store, Driver};
pub use memory::MemoryStore;
pub use metric::{Counters, Gauges, MetricKind, MetricValue, Snapshot};
pub use postgres::PostgresStore;
pub use retry::ConnectRetry;
pub use store::MetricStore;
pub use sync::{SyncPolicy, SyncedStore};
