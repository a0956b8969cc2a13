use std::{future::Future, time::Duration};

use tokio::time::sleep;
use tracing::debug;

/// Fixed backoff used while waiting for a backend to become reachable.
///
/// The first attempt runs immediately, then one more attempt follows each
/// delay in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRetry {
	delays: Vec<Duration>,
}

impl Default for ConnectRetry {
	fn default() -> Self {
		Self::new([1, 3, 5].map(Duration::from_secs))
	}
}

impl ConnectRetry {
	pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
		Self {
			delays: delays.into_iter().collect(),
		}
	}

	/// Retries are disabled, only the immediate attempt runs
	pub fn none() -> Self {
		Self::new([])
	}

	pub fn delays(&self) -> &[Duration] {
		&self.delays
	}

	pub fn attempts(&self) -> usize {
		self.delays.len() + 1
	}

	/// Runs `attempt` until it succeeds or the schedule is exhausted, in which
	/// case the last error is returned.
	pub async fn run<T, E, Fut>(&self, mut attempt: impl FnMut() -> Fut) -> Result<T, E>
	where
		Fut: Future<Output = Result<T, E>>,
		E: std::fmt::Display,
	{
		let mut res = attempt().await;

		for (retry, delay) in self.delays.iter().enumerate() {
			let Err(e) = &res else {
				break;
			};

			debug!(
				attempt = retry + 1,
				sleep_secs = delay.as_secs_f64(),
				"Backend unreachable, retrying: {e}"
			);

			sleep(*delay).await;
			res = attempt().await;
		}

		res
	}
}
