//! PostgreSQL backed store. Every metric is a row; aggregation happens inside
//! the upsert statement so concurrent writers never lose increments.

use std::sync::OnceLock;

use async_trait::async_trait;
use mc_utils::format_float;
use sqlx::{
	postgres::{PgPool, PgPoolOptions},
	Acquire, Connection, Executor, Postgres,
};
use tracing::{debug, info, warn};

use crate::{
	error::Error,
	metric::{MetricKind, MetricValue, Snapshot},
	retry::ConnectRetry,
	store::{parse_update, MetricStore},
};

const MAX_CONNECTIONS: u32 = 10;

// SQLSTATE codes raised when a stored counter text can't take part in the sum
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metrics (
	id     SERIAL PRIMARY KEY,
	mtype  TEXT NOT NULL,
	mname  TEXT NOT NULL,
	mvalue TEXT NOT NULL,
	UNIQUE (mtype, mname)
)"#;

const UPSERT_COUNTER: &str = r#"
INSERT INTO metrics (mtype, mname, mvalue)
VALUES ($1, $2, $3)
ON CONFLICT (mtype, mname) DO
UPDATE SET mvalue = (EXCLUDED.mvalue::bigint + metrics.mvalue::bigint)::text"#;

const UPSERT_GAUGE: &str = r#"
INSERT INTO metrics (mtype, mname, mvalue)
VALUES ($1, $2, $3)
ON CONFLICT (mtype, mname) DO
UPDATE SET mvalue = EXCLUDED.mvalue"#;

const SELECT_ONE: &str = "SELECT mvalue FROM metrics WHERE mtype = $1 AND mname = $2";

const SELECT_ALL: &str = "SELECT mtype, mname, mvalue FROM metrics";

pub struct PostgresStore {
	url: String,
	retry: ConnectRetry,
	pool: OnceLock<PgPool>,
}

impl PostgresStore {
	pub fn new(url: impl Into<String>) -> Self {
		Self::with_retry(url, ConnectRetry::default())
	}

	pub fn with_retry(url: impl Into<String>, retry: ConnectRetry) -> Self {
		Self {
			url: url.into(),
			retry,
			pool: OnceLock::new(),
		}
	}

	fn pool(&self) -> Result<&PgPool, Error> {
		self.pool.get().ok_or(Error::NotOpened)
	}
}

async fn probe(pool: &PgPool) -> Result<(), sqlx::Error> {
	pool.acquire().await?.ping().await
}

fn upsert_statement(kind: MetricKind) -> &'static str {
	match kind {
		MetricKind::Counter => UPSERT_COUNTER,
		MetricKind::Gauge => UPSERT_GAUGE,
	}
}

async fn upsert<'e>(
	executor: impl Executor<'e, Database = Postgres>,
	kind: MetricKind,
	name: &str,
	value: &str,
) -> Result<(), Error> {
	let statement = upsert_statement(kind);

	debug!(sql = statement, %kind, name, value, "Upserting metric");

	sqlx::query(statement)
		.bind(kind.as_ref())
		.bind(name)
		.bind(value)
		.execute(executor)
		.await
		.map(|_| ())
		.map_err(|e| row_error(kind, name, value, e))
}

/// A counter whose stored text isn't a valid integer can't be summed; that is
/// reported as an invalid value rather than a database failure.
fn row_error(kind: MetricKind, name: &str, value: &str, e: sqlx::Error) -> Error {
	let code = e
		.as_database_error()
		.and_then(|db_err| db_err.code())
		.map(|code| code.into_owned());

	match code.as_deref() {
		Some(INVALID_TEXT_REPRESENTATION | NUMERIC_VALUE_OUT_OF_RANGE) => Error::InvalidValue {
			kind,
			value: value.to_string(),
		},
		_ => Error::Row {
			kind,
			name: name.to_string(),
			source: e,
		},
	}
}

#[async_trait]
impl MetricStore for PostgresStore {
	async fn open(&self) -> Result<(), Error> {
		// A URL that doesn't parse is never attempted
		let pool = PgPoolOptions::new()
			.max_connections(MAX_CONNECTIONS)
			.connect_lazy(&self.url)
			.map_err(|source| Error::Connection {
				attempts: 0,
				source,
			})?;

		self.retry
			.run(|| probe(&pool))
			.await
			.map_err(|source| Error::Connection {
				attempts: self.retry.attempts(),
				source,
			})?;

		debug!(sql = CREATE_TABLE, "Ensuring metrics table exists");
		sqlx::query(CREATE_TABLE).execute(&pool).await?;

		if self.pool.set(pool).is_err() {
			warn!("Metric store was already opened, keeping the existing pool");
		} else {
			info!("Opened PostgreSQL metric store");
		}

		Ok(())
	}

	async fn close(&self) -> Result<(), Error> {
		if let Some(pool) = self.pool.get() {
			pool.close().await;
			info!("Closed PostgreSQL metric store");
		}

		Ok(())
	}

	async fn ping(&self) -> Result<(), Error> {
		probe(self.pool()?).await.map_err(Into::into)
	}

	async fn update(&self, kind: &str, name: &str, value: &str) -> Result<(), Error> {
		let (kind, value) = parse_update(kind, value)?;

		upsert(self.pool()?, kind, name, &value.to_string()).await
	}

	async fn get(&self, kind: &str, name: &str) -> Result<String, Error> {
		let kind = MetricKind::parse(kind)?;

		debug!(sql = SELECT_ONE, %kind, name, "Fetching metric");

		let (text,) = sqlx::query_as::<_, (String,)>(SELECT_ONE)
			.bind(kind.as_ref())
			.bind(name)
			.fetch_optional(self.pool()?)
			.await?
			.ok_or_else(|| Error::NotFound {
				kind,
				name: name.to_string(),
			})?;

		MetricValue::parse(kind, &text).map(|value| value.to_string())
	}

	async fn update_all(&self, batch: &Snapshot) -> Result<(), Error> {
		batch.check_gauges()?;

		let mut tx = self.pool()?.begin().await?;

		let rows = batch
			.counters
			.iter()
			.map(|(name, delta)| (MetricKind::Counter, name, delta.to_string()))
			.chain(
				batch
					.gauges
					.iter()
					.map(|(name, value)| (MetricKind::Gauge, name, format_float(*value))),
			);

		// Every row runs in its own savepoint so one failure doesn't poison the
		// rest of the transaction and all failures can be reported together.
		let mut errors = Vec::new();
		for (kind, name, value) in rows {
			let mut savepoint = tx.begin().await?;

			match upsert(&mut *savepoint, kind, name, &value).await {
				Ok(()) => savepoint.commit().await?,
				Err(e) => {
					savepoint.rollback().await?;
					errors.push(e);
				}
			}
		}

		if errors.is_empty() {
			tx.commit().await?;
			debug!(
				counters = batch.counters.len(),
				gauges = batch.gauges.len(),
				"Batch committed"
			);
			Ok(())
		} else {
			tx.rollback().await?;
			Err(Error::Batch { errors })
		}
	}

	async fn get_all(&self) -> Result<Snapshot, Error> {
		debug!(sql = SELECT_ALL, "Fetching all metrics");

		let rows = sqlx::query_as::<_, (String, String, String)>(SELECT_ALL)
			.fetch_all(self.pool()?)
			.await?;

		Ok(rows
			.into_iter()
			.fold(Snapshot::default(), |mut snapshot, (kind, name, text)| {
				match MetricKind::parse(&kind).and_then(|kind| MetricValue::parse(kind, &text)) {
					Ok(value) => snapshot.apply(&name, value),
					Err(e) => warn!(%name, "Skipping unreadable metric row: {e}"),
				}
				snapshot
			}))
	}

	async fn save(&self) -> Result<(), Error> {
		Ok(())
	}

	async fn restore(&self) -> Result<(), Error> {
		Ok(())
	}
}
