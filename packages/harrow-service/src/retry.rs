use std::{fmt::Display, future::Future, time::Duration};

use tokio::time;
use tracing::warn;

use crate::{Error, Result};

pub trait Transient {
	fn is_transient(&self) -> bool;
}
impl Transient for harrow_providers::Error {
	fn is_transient(&self) -> bool {
		harrow_providers::Error::is_transient(self)
	}
}

impl Transient for harrow_storage::Error {
	fn is_transient(&self) -> bool {
		harrow_storage::Error::is_transient(self)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_attempts: u32,
	pub initial_backoff: Duration,
	pub max_backoff: Duration,
}
impl RetryPolicy {
	pub fn from_config(cfg: &harrow_config::Retry) -> Self {
		Self {
			max_attempts: cfg.max_attempts.max(1),
			initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
			max_backoff: Duration::from_millis(cfg.max_backoff_ms),
		}
	}

	/// Delay before retry number `retry` (1-based): doubles from the initial backoff, capped.
	pub fn backoff(&self, retry: u32) -> Duration {
		let mut delay = self.initial_backoff.min(self.max_backoff);

		for _ in 1..retry {
			delay = delay.saturating_mul(2).min(self.max_backoff);
		}

		delay
	}
}

/// Runs `call` under `timeout`, retrying transient failures with exponential backoff.
///
/// A timed-out attempt counts as transient. Exhausting the budget, or any permanent failure,
/// is reported as [`Error::Retrieval`].
pub async fn call_with_retry<T, E, F, Fut>(
	policy: &RetryPolicy,
	stage: &'static str,
	timeout: Duration,
	mut call: F,
) -> Result<T>
where
	E: Transient + Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = std::result::Result<T, E>>,
{
	let mut attempt = 0;

	loop {
		attempt += 1;

		let (transient, message) = match time::timeout(timeout, call()).await {
			Ok(Ok(value)) => return Ok(value),
			Ok(Err(err)) => (err.is_transient(), err.to_string()),
			Err(_) => (true, format!("timed out after {} ms", timeout.as_millis())),
		};

		if !transient || attempt >= policy.max_attempts {
			return Err(Error::Retrieval {
				message: format!("{stage} failed after {attempt} attempt(s): {message}"),
			});
		}

		let delay = policy.backoff(attempt);

		warn!(
			stage,
			attempt,
			delay_ms = delay.as_millis() as u64,
			error = %message,
			"Retrying transient failure."
		);

		time::sleep(delay).await;
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	#[derive(Debug)]
	struct Failure {
		transient: bool,
	}
	impl Display for Failure {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "failure (transient: {})", self.transient)
		}
	}
	impl Transient for Failure {
		fn is_transient(&self) -> bool {
			self.transient
		}
	}

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy {
			max_attempts,
			initial_backoff: Duration::from_millis(1),
			max_backoff: Duration::from_millis(4),
		}
	}

	#[test]
	fn backoff_doubles_until_capped() {
		let policy = RetryPolicy {
			max_attempts: 5,
			initial_backoff: Duration::from_millis(200),
			max_backoff: Duration::from_millis(500),
		};

		assert_eq!(policy.backoff(1), Duration::from_millis(200));
		assert_eq!(policy.backoff(2), Duration::from_millis(400));
		assert_eq!(policy.backoff(3), Duration::from_millis(500));
		assert_eq!(policy.backoff(10), Duration::from_millis(500));
	}

	#[tokio::test]
	async fn transient_failures_are_retried_until_success() {
		let calls = AtomicU32::new(0);
		let value = call_with_retry(&policy(3), "test", Duration::from_secs(1), || {
			let call = calls.fetch_add(1, Ordering::SeqCst);

			async move {
				if call < 2 { Err(Failure { transient: true }) } else { Ok(call) }
			}
		})
		.await
		.expect("third attempt succeeds");

		assert_eq!(value, 2);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn permanent_failures_are_not_retried() {
		let calls = AtomicU32::new(0);
		let err = call_with_retry(&policy(5), "test", Duration::from_secs(1), || {
			calls.fetch_add(1, Ordering::SeqCst);

			async { Err::<(), _>(Failure { transient: false }) }
		})
		.await
		.expect_err("permanent failure");

		assert!(matches!(err, Error::Retrieval { .. }));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn timeouts_consume_the_budget() {
		let calls = AtomicU32::new(0);
		let err = call_with_retry(&policy(2), "embedding", Duration::from_millis(5), || {
			calls.fetch_add(1, Ordering::SeqCst);

			async {
				time::sleep(Duration::from_secs(5)).await;

				Ok::<(), Failure>(())
			}
		})
		.await
		.expect_err("every attempt times out");

		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert!(err.to_string().contains("embedding failed after 2 attempt(s)"));
	}
}
