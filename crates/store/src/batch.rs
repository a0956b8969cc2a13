//! Turns a heterogeneous list of metric items into one typed batch.

use serde::{Deserialize, Serialize};

use crate::{
	error::Error,
	metric::{MetricKind, MetricValue, Snapshot},
};

/// A single metric as it travels between agent and collector.
///
/// Exactly one of `delta` (counters) or `value` (gauges) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricItem {
	pub id: String,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub delta: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<f64>,
}

impl MetricItem {
	pub fn counter(id: impl Into<String>, delta: i64) -> Self {
		Self::from_value(id, MetricValue::Counter(delta))
	}

	pub fn gauge(id: impl Into<String>, value: f64) -> Self {
		Self::from_value(id, MetricValue::Gauge(value))
	}

	pub fn from_value(id: impl Into<String>, value: MetricValue) -> Self {
		let (delta, gauge) = match value {
			MetricValue::Counter(delta) => (Some(delta), None),
			MetricValue::Gauge(value) => (None, Some(value)),
		};

		Self {
			id: id.into(),
			kind: value.kind().to_string(),
			delta,
			value: gauge,
		}
	}

	/// Validates the item, yielding its typed value
	pub fn to_value(&self) -> Result<MetricValue, Error> {
		let malformed = |reason| Error::MalformedItem {
			id: self.id.clone(),
			reason,
		};

		if self.id.is_empty() {
			return Err(malformed("missing metric name"));
		}

		match (MetricKind::parse(&self.kind)?, self.delta, self.value) {
			(_, Some(_), Some(_)) => Err(malformed("both delta and value are set")),
			(_, None, None) => Err(malformed("neither delta nor value is set")),
			(MetricKind::Counter, Some(delta), None) => Ok(MetricValue::Counter(delta)),
			(MetricKind::Gauge, None, Some(value)) if !value.is_finite() => Err(Error::InvalidValue {
				kind: MetricKind::Gauge,
				value: value.to_string(),
			}),
			(MetricKind::Gauge, None, Some(value)) => Ok(MetricValue::Gauge(value)),
			(MetricKind::Counter, None, Some(_)) => Err(malformed("counter carries a value")),
			(MetricKind::Gauge, Some(_), None) => Err(malformed("gauge carries a delta")),
		}
	}
}

/// Validates every item and folds them into one batch: counter deltas sharing a
/// name are summed, gauges sharing a name keep the last value in request order.
///
/// Nothing is returned unless every item is well formed, so a bad item rejects
/// the batch before any store sees it.
pub fn reconcile(items: &[MetricItem]) -> Result<Snapshot, Error> {
	items.iter().try_fold(Snapshot::default(), |mut batch, item| {
		batch.apply(&item.id, item.to_value()?);
		Ok(batch)
	})
}
