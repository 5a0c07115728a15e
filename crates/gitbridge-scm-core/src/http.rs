// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Mapping from backend HTTP responses and transport failures to
//! [`ScmError`].
//!
//! Every adapter funnels its responses through [`check`] (or [`json`]) so the
//! status table below is the single source of truth:
//!
//! | Status                 | Kind                                   |
//! |------------------------|----------------------------------------|
//! | 400, 422, other 4xx    | `Validation`                           |
//! | 401                    | `AuthExpired`                          |
//! | 403                    | `Forbidden`, or `RateLimited` when the backend says so |
//! | 404, 410               | `NotFound`                             |
//! | 409                    | `Conflict`                             |
//! | 429                    | `RateLimited`                          |
//! | 408, 5xx               | `Unavailable`                          |

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{Result, ScmError};

const MAX_MESSAGE_LEN: usize = 512;

/// Return the response untouched on success, otherwise read the body and map
/// the failure.
pub async fn check(response: Response) -> Result<Response> {
	let status = response.status();
	if status.is_success() {
		return Ok(response);
	}

	let headers = response.headers().clone();
	let url = response.url().clone();
	let body = response.text().await.unwrap_or_default();
	let err = error_for_status(status, &headers, &body);

	warn!(
		status = status.as_u16(),
		url = %url,
		kind = ?err.kind(),
		"backend request failed"
	);
	Err(err)
}

/// [`check`] and decode a JSON body.
pub async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
	json_body(check(response).await?).await
}

/// Decode the JSON body of a response already known to be successful.
pub async fn json_body<T: DeserializeOwned>(response: Response) -> Result<T> {
	response.json::<T>().await.map_err(from_transport)
}

/// Map a non-success status to the error taxonomy.
pub fn error_for_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ScmError {
	let message = summarize_body(body).unwrap_or_else(|| {
		status
			.canonical_reason()
			.unwrap_or("unexpected status")
			.to_string()
	});
	let code = status.as_u16();

	let err = match code {
		401 => ScmError::auth_expired(message),
		403 if is_rate_limit_response(headers, body) => {
			ScmError::rate_limited(retry_after(headers), message)
		}
		403 => ScmError::forbidden(message),
		404 | 410 => ScmError::not_found(message),
		409 => ScmError::conflict(message),
		429 => ScmError::rate_limited(retry_after(headers), message),
		408 => ScmError::unavailable(true, message),
		500..=599 => ScmError::unavailable(true, message),
		_ => ScmError::validation(message),
	};
	err.with_status(code)
}

/// Map a `reqwest` failure.
///
/// Only connection failures prove the request never reached the backend;
/// everything else (including timeouts after connecting) is ambiguous.
pub fn from_transport(err: reqwest::Error) -> ScmError {
	if err.is_builder() {
		return ScmError::validation(format!("invalid request: {err}"));
	}
	if err.is_decode() {
		return ScmError::unavailable(true, format!("unexpected response body: {err}"));
	}

	let mapped = ScmError::unavailable(!err.is_connect(), err.to_string());
	match err.status() {
		Some(status) => mapped.with_status(status.as_u16()),
		None => mapped,
	}
}

/// Wrap a response body that arrived but did not have the expected shape.
pub fn malformed(what: impl std::fmt::Display) -> ScmError {
	ScmError::unavailable(true, format!("malformed backend response: {what}"))
}

fn is_rate_limit_response(headers: &HeaderMap, body: &str) -> bool {
	quota_exhausted(headers)
		|| headers.contains_key(RETRY_AFTER)
		|| body.to_ascii_lowercase().contains("rate limit")
}

/// Whether the backend reports zero remaining quota.
pub fn quota_exhausted(headers: &HeaderMap) -> bool {
	["x-ratelimit-remaining", "ratelimit-remaining"]
		.iter()
		.any(|name| header_u64(headers, name) == Some(0))
}

/// Read the backend's retry hint relative to the current time.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
	retry_after_at(headers, Utc::now())
}

/// Read the retry hint, in order of preference: `Retry-After` (seconds or
/// HTTP-date), then an epoch reset time (`x-ratelimit-reset`,
/// `RateLimit-Reset`) when quota is exhausted.
pub fn retry_after_at(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
	if let Some(value) = header_str(headers, RETRY_AFTER.as_str()) {
		if let Ok(secs) = value.parse::<u64>() {
			return Some(Duration::from_secs(secs));
		}
		if let Ok(at) = DateTime::parse_from_rfc2822(value) {
			return Some(until(now, at.with_timezone(&Utc)));
		}
	}

	if quota_exhausted(headers) {
		for name in ["x-ratelimit-reset", "ratelimit-reset"] {
			if let Some(epoch) = header_u64(headers, name).and_then(|v| i64::try_from(v).ok()) {
				if let Some(at) = DateTime::<Utc>::from_timestamp(epoch, 0) {
					return Some(until(now, at));
				}
			}
		}
	}

	None
}

fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
	(at - now).to_std().unwrap_or(Duration::ZERO)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get(name)
		.and_then(|v| v.to_str().ok())
		.map(str::trim)
}

/// Parse a numeric response header.
pub fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
	header_str(headers, name).and_then(|v| v.parse().ok())
}

/// Pull a human-readable message out of an error body.
///
/// GitHub and Bitbucket nest it as `message` / `error.message`; GitLab uses
/// `message` (sometimes an array or object) or `error_description`.
fn summarize_body(body: &str) -> Option<String> {
	let trimmed = body.trim();
	if trimmed.is_empty() {
		return None;
	}

	let message = match serde_json::from_str::<serde_json::Value>(trimmed) {
		Ok(value) => extract_message(&value).unwrap_or_else(|| trimmed.to_string()),
		Err(_) => trimmed.to_string(),
	};
	Some(truncate(&message, MAX_MESSAGE_LEN))
}

fn extract_message(value: &serde_json::Value) -> Option<String> {
	let candidates = [
		value.get("message"),
		value.get("error").and_then(|e| e.get("message")),
		value.get("error_description"),
		value.get("error"),
	];

	let mut message = candidates.into_iter().flatten().find_map(|v| match v {
		serde_json::Value::String(s) => Some(s.clone()),
		serde_json::Value::Null => None,
		other => Some(other.to_string()),
	})?;

	// GitHub puts the useful part of a 422 in `errors[].message`.
	if let Some(details) = value.get("errors").and_then(|e| e.as_array()) {
		let detail: Vec<&str> = details
			.iter()
			.filter_map(|d| d.get("message").and_then(|m| m.as_str()))
			.collect();
		if !detail.is_empty() {
			message = format!("{message}: {}", detail.join("; "));
		}
	}
	Some(message)
}

fn truncate(s: &str, max: usize) -> String {
	if s.len() <= max {
		return s.to_string();
	}
	let mut end = max;
	while !s.is_char_boundary(end) {
		end -= 1;
	}
	format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;
	use reqwest::header::HeaderValue;

	fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
		let mut map = HeaderMap::new();
		for (name, value) in pairs {
			map.insert(*name, HeaderValue::from_str(value).unwrap());
		}
		map
	}

	#[test]
	fn status_table() {
		let cases = [
			(400, ErrorKind::Validation),
			(401, ErrorKind::AuthExpired),
			(403, ErrorKind::Forbidden),
			(404, ErrorKind::NotFound),
			(408, ErrorKind::Unavailable),
			(409, ErrorKind::Conflict),
			(410, ErrorKind::NotFound),
			(422, ErrorKind::Validation),
			(429, ErrorKind::RateLimited),
			(500, ErrorKind::Unavailable),
			(502, ErrorKind::Unavailable),
			(503, ErrorKind::Unavailable),
		];
		for (code, kind) in cases {
			let status = StatusCode::from_u16(code).unwrap();
			let err = error_for_status(status, &HeaderMap::new(), "");
			assert_eq!(err.kind(), kind, "{code}");
			assert_eq!(err.status(), Some(code));
		}
	}

	#[test]
	fn server_errors_count_as_sent() {
		let err = error_for_status(StatusCode::BAD_GATEWAY, &HeaderMap::new(), "");
		assert!(matches!(
			err,
			ScmError::Unavailable {
				request_sent: true,
				..
			}
		));
	}

	#[test]
	fn github_403_with_exhausted_quota_is_rate_limited() {
		let now = Utc::now();
		let reset = now.timestamp() + 120;
		let h = headers(&[
			("x-ratelimit-remaining", "0"),
			("x-ratelimit-reset", &reset.to_string()),
		]);
		let err = error_for_status(StatusCode::FORBIDDEN, &h, r#"{"message":"API rate limit exceeded"}"#);
		assert_eq!(err.kind(), ErrorKind::RateLimited);
		assert_eq!(err.status(), Some(403));

		let wait = retry_after_at(&h, now).unwrap();
		assert_eq!(wait, Duration::from_secs(120));
	}

	#[test]
	fn secondary_rate_limit_message_is_recognised() {
		let err = error_for_status(
			StatusCode::FORBIDDEN,
			&headers(&[("retry-after", "60")]),
			r#"{"message":"You have exceeded a secondary rate limit."}"#,
		);
		assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
	}

	#[test]
	fn plain_403_stays_forbidden() {
		let err = error_for_status(
			StatusCode::FORBIDDEN,
			&headers(&[("x-ratelimit-remaining", "4999")]),
			r#"{"message":"Resource not accessible by integration"}"#,
		);
		assert_eq!(err.kind(), ErrorKind::Forbidden);
		assert!(err.to_string().contains("Resource not accessible"));
	}

	#[test]
	fn retry_after_http_date() {
		let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
			.unwrap()
			.with_timezone(&Utc);
		let h = headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:30 GMT")]);
		assert_eq!(retry_after_at(&h, now), Some(Duration::from_secs(30)));
	}

	#[test]
	fn retry_after_in_the_past_is_zero() {
		let now = Utc::now();
		let h = headers(&[
			("ratelimit-remaining", "0"),
			("ratelimit-reset", &(now.timestamp() - 10).to_string()),
		]);
		assert_eq!(retry_after_at(&h, now), Some(Duration::ZERO));
	}

	#[test]
	fn reset_without_exhausted_quota_is_ignored() {
		let h = headers(&[
			("x-ratelimit-remaining", "12"),
			("x-ratelimit-reset", "1700000000"),
		]);
		assert_eq!(retry_after_at(&h, Utc::now()), None);
	}

	#[test]
	fn unprocessable_entity_collects_nested_messages() {
		let body = r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for tupe12334:feature."}]}"#;
		let err = error_for_status(StatusCode::UNPROCESSABLE_ENTITY, &HeaderMap::new(), body);
		assert!(err
			.to_string()
			.contains("Validation Failed: A pull request already exists"));
	}

	#[test]
	fn long_bodies_are_truncated() {
		let body = "x".repeat(2000);
		let err = error_for_status(StatusCode::BAD_REQUEST, &HeaderMap::new(), &body);
		assert!(err.to_string().len() < 600);
	}

	#[test]
	fn empty_body_falls_back_to_reason() {
		let err = error_for_status(StatusCode::NOT_FOUND, &HeaderMap::new(), "  ");
		assert_eq!(err.to_string(), "not found: Not Found");
	}

	#[test]
	fn gitlab_message_object_is_stringified() {
		let body = r#"{"message":{"base":["Another open merge request already exists for this source branch: !1"]}}"#;
		let err = error_for_status(StatusCode::CONFLICT, &HeaderMap::new(), body);
		assert_eq!(err.kind(), ErrorKind::Conflict);
		assert!(err.to_string().contains("Another open merge request"));
	}

	#[tokio::test]
	async fn refused_connection_was_never_sent() {
		let err = reqwest::Client::new()
			.get("http://127.0.0.1:1/")
			.send()
			.await
			.unwrap_err();
		let mapped = from_transport(err);
		assert!(
			matches!(
				mapped,
				ScmError::Unavailable {
					request_sent: false,
					status: None,
					..
				}
			),
			"{mapped:?}"
		);
	}

	#[tokio::test]
	async fn timeout_after_connecting_is_ambiguous() {
		use std::time::Duration;
		use wiremock::matchers::method;
		use wiremock::{Mock, MockServer, ResponseTemplate};

		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
			.mount(&server)
			.await;

		let client = reqwest::Client::builder()
			.timeout(Duration::from_millis(100))
			.build()
			.unwrap();
		let err = client.get(server.uri()).send().await.unwrap_err();
		assert!(err.is_timeout());

		let mapped = from_transport(err);
		assert!(
			matches!(
				mapped,
				ScmError::Unavailable {
					request_sent: true,
					..
				}
			),
			"{mapped:?}"
		);
	}
}
