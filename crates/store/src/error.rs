use mc_utils::error::FileIOError;

use thiserror::Error;

use crate::metric::MetricKind;

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid metric type <type='{0}'>")]
	InvalidMetricType(String),
	#[error("invalid value for {kind} metric <value='{value}'>")]
	InvalidValue { kind: MetricKind, value: String },
	#[error("metric not found <type='{kind}', name='{name}'>")]
	NotFound { kind: MetricKind, name: String },
	#[error("malformed batch item <id='{id}'>: {reason}")]
	MalformedItem { id: String, reason: &'static str },
	#[error("store used before it was opened")]
	NotOpened,

	#[error("database unreachable after {attempts} attempts: {source}")]
	Connection {
		attempts: usize,
		#[source]
		source: sqlx::Error,
	},
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
	#[error("failed to upsert {kind} metric <name='{name}'>: {source}")]
	Row {
		kind: MetricKind,
		name: String,
		#[source]
		source: sqlx::Error,
	},
	#[error("batch update rolled back, {} rows failed: {}", .errors.len(), join_errors(.errors))]
	Batch { errors: Vec<Error> },

	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("snapshot (de)serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl Error {
	/// Errors caused by what the caller sent, as opposed to failures of the store itself
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			Self::InvalidMetricType(_) | Self::InvalidValue { .. } | Self::MalformedItem { .. }
		)
	}
}

fn join_errors(errors: &[Error]) -> String {
	errors
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join("; ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn batch_error_reports_every_row() {
		let err = Error::Batch {
			errors: vec![
				Error::InvalidValue {
					kind: MetricKind::Counter,
					value: "abc".to_string(),
				},
				Error::NotOpened,
			],
		};

		assert_eq!(
			err.to_string(),
			"batch update rolled back, 2 rows failed: invalid value for counter metric \
			<value='abc'>; store used before it was opened"
		);
	}

	#[test]
	fn client_errors() {
		assert!(Error::InvalidMetricType("histogram".to_string()).is_client_error());
		assert!(!Error::NotFound {
			kind: MetricKind::Gauge,
			name: "temp".to_string()
		}
		.is_client_error());
		assert!(!Error::NotOpened.is_client_error());
	}
}
