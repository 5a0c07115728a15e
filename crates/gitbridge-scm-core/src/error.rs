// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Normalized failure taxonomy shared by every provider adapter.

use std::time::Duration;

use gitbridge_common_http::{RetryClass, RetryableError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScmError>;

/// Every failure that crosses the crate boundary.
///
/// `status` carries the backend HTTP status when the failure came from a
/// response, so callers can log or surface it without parsing messages.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScmError {
	#[error("not found: {message}")]
	NotFound { status: Option<u16>, message: String },

	#[error("forbidden: {message}")]
	Forbidden { status: Option<u16>, message: String },

	/// The credential lease could not be renewed, or the backend rejected it.
	#[error("authorization expired or revoked: {message}")]
	AuthExpired { status: Option<u16>, message: String },

	#[error("rate limited by backend{}: {message}", fmt_retry_after(.retry_after))]
	RateLimited {
		status: Option<u16>,
		retry_after: Option<Duration>,
		message: String,
	},

	#[error("conflict: {message}")]
	Conflict { status: Option<u16>, message: String },

	#[error("validation failed: {message}")]
	Validation { status: Option<u16>, message: String },

	/// Transport failure, timeout, or 5xx. `request_sent` is false only when
	/// the request provably never reached the backend.
	#[error("backend unavailable: {message}")]
	Unavailable {
		status: Option<u16>,
		request_sent: bool,
		message: String,
	},

	#[error("unsupported provider: {provider}")]
	UnsupportedProvider { provider: String },
}

fn fmt_retry_after(retry_after: &Option<Duration>) -> String {
	match retry_after {
		Some(d) => format!(" (retry after {}s)", d.as_secs()),
		None => String::new(),
	}
}

/// Discriminant of [`ScmError`] for callers that only need to branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	NotFound,
	Forbidden,
	AuthExpired,
	RateLimited,
	Conflict,
	Validation,
	Unavailable,
	UnsupportedProvider,
}

impl ScmError {
	pub fn not_found(message: impl Into<String>) -> Self {
		Self::NotFound {
			status: None,
			message: message.into(),
		}
	}

	pub fn forbidden(message: impl Into<String>) -> Self {
		Self::Forbidden {
			status: None,
			message: message.into(),
		}
	}

	pub fn auth_expired(message: impl Into<String>) -> Self {
		Self::AuthExpired {
			status: None,
			message: message.into(),
		}
	}

	pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
		Self::RateLimited {
			status: None,
			retry_after,
			message: message.into(),
		}
	}

	pub fn conflict(message: impl Into<String>) -> Self {
		Self::Conflict {
			status: None,
			message: message.into(),
		}
	}

	pub fn validation(message: impl Into<String>) -> Self {
		Self::Validation {
			status: None,
			message: message.into(),
		}
	}

	pub fn unavailable(request_sent: bool, message: impl Into<String>) -> Self {
		Self::Unavailable {
			status: None,
			request_sent,
			message: message.into(),
		}
	}

	pub fn unsupported_provider(provider: impl Into<String>) -> Self {
		Self::UnsupportedProvider {
			provider: provider.into(),
		}
	}

	/// Attach the backend HTTP status.
	pub fn with_status(mut self, code: u16) -> Self {
		match &mut self {
			Self::NotFound { status, .. }
			| Self::Forbidden { status, .. }
			| Self::AuthExpired { status, .. }
			| Self::RateLimited { status, .. }
			| Self::Conflict { status, .. }
			| Self::Validation { status, .. }
			| Self::Unavailable { status, .. } => *status = Some(code),
			Self::UnsupportedProvider { .. } => {}
		}
		self
	}

	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::NotFound { .. } => ErrorKind::NotFound,
			Self::Forbidden { .. } => ErrorKind::Forbidden,
			Self::AuthExpired { .. } => ErrorKind::AuthExpired,
			Self::RateLimited { .. } => ErrorKind::RateLimited,
			Self::Conflict { .. } => ErrorKind::Conflict,
			Self::Validation { .. } => ErrorKind::Validation,
			Self::Unavailable { .. } => ErrorKind::Unavailable,
			Self::UnsupportedProvider { .. } => ErrorKind::UnsupportedProvider,
		}
	}

	pub fn status(&self) -> Option<u16> {
		match self {
			Self::NotFound { status, .. }
			| Self::Forbidden { status, .. }
			| Self::AuthExpired { status, .. }
			| Self::RateLimited { status, .. }
			| Self::Conflict { status, .. }
			| Self::Validation { status, .. }
			| Self::Unavailable { status, .. } => *status,
			Self::UnsupportedProvider { .. } => None,
		}
	}

	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::RateLimited { retry_after, .. } => *retry_after,
			_ => None,
		}
	}

	pub fn is_auth_expired(&self) -> bool {
		matches!(self, Self::AuthExpired { .. })
	}

	/// Whether the tenant has to reconnect their account to recover.
	pub fn requires_reconnect(&self) -> bool {
		matches!(self, Self::AuthExpired { .. } | Self::Forbidden { .. })
	}
}

impl RetryableError for ScmError {
	fn retry_class(&self) -> RetryClass {
		match self {
			Self::RateLimited { retry_after, .. } => RetryClass::RateLimited {
				retry_after: *retry_after,
			},
			Self::Unavailable { request_sent, .. } => RetryClass::Transient {
				request_sent: *request_sent,
			},
			_ => RetryClass::Never,
		}
	}
}
