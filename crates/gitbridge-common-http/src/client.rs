// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

/// Upper bound for a single request, connect through body.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for establishing the TCP/TLS connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates a client builder with the standard User-Agent.
///
/// GitHub rejects API requests without a User-Agent, so every adapter starts
/// from this builder.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Creates a client whose requests never outlive `timeout`.
///
/// The connect phase gets its own, shorter bound so a refused or unreachable
/// backend surfaces as a connect error (safe to retry even for
/// non-idempotent calls) rather than a generic timeout.
pub fn new_client_with_timeout(timeout: Duration) -> Result<Client, reqwest::Error> {
	builder()
		.timeout(timeout)
		.connect_timeout(timeout.min(DEFAULT_CONNECT_TIMEOUT))
		.build()
}

/// Returns the standard User-Agent string, `gitbridge/{version}`.
pub fn user_agent() -> String {
	format!("gitbridge/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_has_product_and_version() {
		let ua = user_agent();
		let (product, version) = ua.split_once('/').unwrap();
		assert_eq!(product, "gitbridge");
		assert!(!version.is_empty());
	}

	#[test]
	fn client_builds_with_short_timeout() {
		assert!(new_client_with_timeout(Duration::from_millis(500)).is_ok());
	}
}
