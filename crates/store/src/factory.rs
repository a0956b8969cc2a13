use std::{str::FromStr, sync::Arc};

use strum::{AsRefStr, Display, EnumString};

use crate::{memory::MemoryStore, postgres::PostgresStore, store::MetricStore};

/// Backend identifiers as they appear in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display, EnumString)]
pub enum Driver {
	#[default]
	#[strum(to_string = "mem")]
	Memory,
	#[strum(to_string = "file")]
	File,
	#[strum(to_string = "pgx", serialize = "postgres")]
	Postgres,
}

impl Driver {
	/// Unknown identifiers fall back to the in-memory driver; validating them
	/// is up to whoever reads the configuration.
	pub fn from_name(name: &str) -> Self {
		Self::from_str(name).unwrap_or_default()
	}
}

/// Builds the backend for `driver`.
///
/// `location` is the snapshot path for [`Driver::File`] (empty disables
/// persistence) and the connection URL for [`Driver::Postgres`]. It is
/// ignored by [`Driver::Memory`].
pub fn new_store(driver: Driver, location: &str) -> Arc<dyn MetricStore> {
	match driver {
		Driver::Memory => Arc::new(MemoryStore::ephemeral()),
		Driver::File => Arc::new(MemoryStore::with_snapshot_file(location)),
		Driver::Postgres => Arc::new(PostgresStore::new(location)),
	}
}
