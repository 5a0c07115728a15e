// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use url::{Host, Url};

use crate::error::ConfigError;

/// Validate and normalize a backend base URL.
///
/// Requirements:
/// - Must be a valid absolute URL with a host
/// - Must use HTTPS
/// - Must not point at a loopback address
///
/// The path is normalized to end with `/` so relative joins keep any prefix
/// such as `/api/v4/` or `/api/v3/`.
pub fn validate_base_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
	let mut url = Url::parse(raw.trim())
		.map_err(|e| ConfigError::invalid(field, format!("'{raw}' is not a URL: {e}")))?;

	if url.scheme() != "https" {
		return Err(ConfigError::invalid(
			field,
			format!("must use https, got '{}'", url.scheme()),
		));
	}

	let loopback = match url.host() {
		None => return Err(ConfigError::invalid(field, "must include a host")),
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => ip.is_loopback(),
		Some(Host::Ipv6(ip)) => ip.is_loopback(),
	};
	if loopback {
		return Err(ConfigError::invalid(field, "must not be localhost"));
	}

	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());
		url.set_path(&path);
	}
	url.set_query(None);
	url.set_fragment(None);

	Ok(url)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_https_and_adds_trailing_slash() {
		let url = validate_base_url("gitlab.base_url", "https://gitlab.example.com/api/v4").unwrap();
		assert_eq!(url.as_str(), "https://gitlab.example.com/api/v4/");
		assert_eq!(
			url.join("projects").unwrap().as_str(),
			"https://gitlab.example.com/api/v4/projects"
		);
	}

	#[test]
	fn bare_host_gets_root_path() {
		let url = validate_base_url("github.base_url", "https://api.github.com").unwrap();
		assert_eq!(url.as_str(), "https://api.github.com/");
	}

	#[test]
	fn rejects_plain_http() {
		let err = validate_base_url("github.base_url", "http://api.github.com").unwrap_err();
		assert!(err.to_string().contains("https"));
	}

	#[test]
	fn rejects_loopback_hosts() {
		for raw in [
			"https://localhost/api",
			"https://127.0.0.1/api",
			"https://[::1]/api",
			"https://LOCALHOST",
		] {
			assert!(validate_base_url("base_url", raw).is_err(), "{raw}");
		}
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			validate_base_url("base_url", "not a url"),
			Err(ConfigError::Invalid { .. })
		));
	}
}
