//! Metric kinds, their values and the snapshot shape shared by every backend.

use std::{collections::BTreeMap, fmt, str::FromStr};

use mc_utils::format_float;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::error::Error;

pub type Counters = BTreeMap<String, i64>;
pub type Gauges = BTreeMap<String, f64>;

/// The two metric kinds. Each kind is its own namespace, so `"load"` can exist
/// as a counter and as a gauge at the same time.
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
	/// Signed 64 bit integer, accumulated by addition
	Counter,
	/// 64 bit float, replaced on every update
	Gauge,
}

impl MetricKind {
	/// Like [`FromStr`], but failing with the store's error type
	pub fn parse(kind: &str) -> Result<Self, Error> {
		Self::from_str(kind).map_err(|_| Error::InvalidMetricType(kind.to_string()))
	}
}

/// A value in the native representation of its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
	Counter(i64),
	Gauge(f64),
}

impl MetricValue {
	pub fn parse(kind: MetricKind, value: &str) -> Result<Self, Error> {
		let invalid = || Error::InvalidValue {
			kind,
			value: value.to_string(),
		};

		match kind {
			MetricKind::Counter => value.parse().map(Self::Counter).map_err(|_| invalid()),
			// NaN and infinities have no JSON form
			MetricKind::Gauge => value
				.parse::<f64>()
				.ok()
				.filter(|gauge| gauge.is_finite())
				.map(Self::Gauge)
				.ok_or_else(invalid),
		}
	}

	pub fn kind(&self) -> MetricKind {
		match self {
			Self::Counter(_) => MetricKind::Counter,
			Self::Gauge(_) => MetricKind::Gauge,
		}
	}
}

impl fmt::Display for MetricValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Counter(delta) => write!(f, "{delta}"),
			Self::Gauge(value) => f.write_str(&format_float(*value)),
		}
	}
}

/// Every counter and gauge held by a store at one point in time.
///
/// Also the shape of a reconciled batch: counters then hold deltas that get
/// added to the stored values, gauges hold values that replace them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
	#[serde(default)]
	pub counters: Counters,
	#[serde(default)]
	pub gauges: Gauges,
}

impl Snapshot {
	pub fn is_empty(&self) -> bool {
		self.counters.is_empty() && self.gauges.is_empty()
	}

	pub fn len(&self) -> usize {
		self.counters.len() + self.gauges.len()
	}

	pub fn get(&self, kind: MetricKind, name: &str) -> Option<MetricValue> {
		match kind {
			MetricKind::Counter => self.counters.get(name).copied().map(MetricValue::Counter),
			MetricKind::Gauge => self.gauges.get(name).copied().map(MetricValue::Gauge),
		}
	}

	/// Fails on the first gauge that can't be written as JSON
	pub fn check_gauges(&self) -> Result<(), Error> {
		match self.gauges.values().find(|value| !value.is_finite()) {
			Some(value) => Err(Error::InvalidValue {
				kind: MetricKind::Gauge,
				value: value.to_string(),
			}),
			None => Ok(()),
		}
	}

	/// Adds a counter delta or replaces a gauge value
	pub fn apply(&mut self, name: &str, value: MetricValue) {
		match value {
			MetricValue::Counter(delta) => {
				let counter = self.counters.entry(name.to_string()).or_default();
				*counter = counter.wrapping_add(delta);
			}
			MetricValue::Gauge(value) => {
				self.gauges.insert(name.to_string(), value);
			}
		}
	}

	/// Applies a whole batch with the same rules as [`Snapshot::apply`]
	pub fn merge(&mut self, batch: &Snapshot) {
		for (name, delta) in &batch.counters {
			self.apply(name, MetricValue::Counter(*delta));
		}
		for (name, value) in &batch.gauges {
			self.apply(name, MetricValue::Gauge(*value));
		}
	}
}
