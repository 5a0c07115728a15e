// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry engine for hosting-provider calls.
//!
//! Three failure classes are retried, each under its own bound:
//!
//! - **Transient** (transport errors, 5xx): exponential backoff with jitter
//!   up to `max_attempts` for idempotent calls. Non-idempotent calls get at
//!   most one retry, and only when the request never reached the backend.
//! - **Rate limited**: sleep for the backend-declared delay (or the backoff
//!   delay when none was given) while the cumulative wait stays within
//!   `max_rate_limit_wait`.
//! - **Never**: returned on the first occurrence.
//!
//! Dropping the returned future cancels the in-flight attempt or sleep; no
//! further attempts are made.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Total attempts (first try included) for transient failures of
	/// idempotent calls.
	pub max_attempts: u32,
	#[serde(with = "millis", rename = "base_delay_ms")]
	pub base_delay: Duration,
	#[serde(with = "millis", rename = "max_delay_ms")]
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
	/// Cumulative sleep allowed across rate-limit retries of one call.
	#[serde(with = "millis", rename = "max_rate_limit_wait_ms")]
	pub max_rate_limit_wait: Duration,
	pub max_rate_limit_retries: u32,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
			max_rate_limit_wait: Duration::from_secs(60),
			max_rate_limit_retries: 5,
		}
	}
}

impl RetryConfig {
	/// A configuration that never retries.
	pub fn disabled() -> Self {
		Self {
			max_attempts: 1,
			max_rate_limit_retries: 0,
			max_rate_limit_wait: Duration::ZERO,
			..Self::default()
		}
	}

	/// Reject values the backoff curve cannot work with.
	pub fn validate(&self) -> Result<(), InvalidRetryConfig> {
		if self.max_attempts == 0 {
			return Err(InvalidRetryConfig {
				field: "max_attempts",
				reason: "must be at least 1".to_string(),
			});
		}
		if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
			return Err(InvalidRetryConfig {
				field: "backoff_factor",
				reason: format!("must be a finite non-negative number, got {}", self.backoff_factor),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("retry.{field} {reason}")]
pub struct InvalidRetryConfig {
	pub field: &'static str,
	pub reason: String,
}

/// Rate-limit retries and wait already spent by one logical call.
///
/// [`retry`] starts from an empty budget. Callers that repeat a whole
/// [`retry_with_budget`] pass (for example after renewing credentials) pass
/// the same budget again so `max_rate_limit_wait` bounds the call as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryBudget {
	rate_limit_retries: u32,
	rate_limit_waited: Duration,
}

impl RetryBudget {
	pub fn rate_limit_waited(&self) -> Duration {
		self.rate_limit_waited
	}
}

/// Whether repeating a call can change backend state more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idempotency {
	Idempotent,
	NonIdempotent,
}

/// How the retry engine should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
	Never,
	/// `request_sent` is false only when the failure provably happened before
	/// the backend could have received the request (connect refused, connect
	/// timeout).
	Transient { request_sent: bool },
	RateLimited { retry_after: Option<Duration> },
}

pub trait RetryableError {
	fn retry_class(&self) -> RetryClass;
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let exponential = cfg.base_delay.as_secs_f64() * cfg.backoff_factor.powi(attempt as i32);
	let capped = exponential.min(cfg.max_delay.as_secs_f64());

	let delay = if cfg.jitter {
		capped * (0.5 + fastrand::f64())
	} else {
		capped
	};

	Duration::try_from_secs_f64(delay).unwrap_or(cfg.max_delay)
}

/// Run `f` until it succeeds or the policy gives up, returning the last error.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, idempotency: Idempotency, f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	retry_with_budget(cfg, idempotency, &mut RetryBudget::default(), f).await
}

/// [`retry`] drawing rate-limit waits from a caller-held `budget`.
pub async fn retry_with_budget<F, Fut, T, E>(
	cfg: &RetryConfig,
	idempotency: Idempotency,
	budget: &mut RetryBudget,
	mut f: F,
) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Debug,
{
	let mut transient_failures = 0u32;

	loop {
		let err = match f().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		let delay = match err.retry_class() {
			RetryClass::Never => {
				debug!(error = ?err, "non-retryable error");
				return Err(err);
			}
			RetryClass::Transient { request_sent } => {
				transient_failures += 1;

				let limit = match idempotency {
					Idempotency::Idempotent => cfg.max_attempts,
					Idempotency::NonIdempotent if request_sent => 1,
					Idempotency::NonIdempotent => cfg.max_attempts.min(2),
				};

				if transient_failures >= limit {
					warn!(
						error = ?err,
						attempt = transient_failures,
						?idempotency,
						request_sent,
						"giving up after transient failure"
					);
					return Err(err);
				}

				calculate_delay(cfg, transient_failures - 1)
			}
			RetryClass::RateLimited { retry_after } => {
				budget.rate_limit_retries += 1;
				let delay = retry_after
					.unwrap_or_else(|| calculate_delay(cfg, budget.rate_limit_retries - 1));

				if budget.rate_limit_retries > cfg.max_rate_limit_retries
					|| budget.rate_limit_waited.saturating_add(delay) > cfg.max_rate_limit_wait
				{
					warn!(
						error = ?err,
						retry_after_ms = delay.as_millis(),
						waited_ms = budget.rate_limit_waited.as_millis(),
						max_wait_ms = cfg.max_rate_limit_wait.as_millis(),
						"rate limit wait budget exhausted"
					);
					return Err(err);
				}

				budget.rate_limit_waited += delay;
				delay
			}
		};

		warn!(
			error = ?err,
			delay_ms = delay.as_millis(),
			"retrying after error"
		);
		tokio::time::sleep(delay).await;
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u64(value.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
