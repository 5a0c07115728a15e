// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration for the Bitbucket Cloud adapter.

use std::env;
use std::time::Duration;

use gitbridge_common_config::{
	env_parse, require_secret_env, validate_base_url, ConfigError, SecretString,
};
use gitbridge_common_http::DEFAULT_REQUEST_TIMEOUT;
use gitbridge_scm_auth::{ClientAuth, OAuthClient, DEFAULT_REFRESH_MARGIN};
use reqwest::Url;
use tracing::warn;

const DEFAULT_API_URL: &str = "https://api.bitbucket.org/2.0/";
const DEFAULT_SITE_URL: &str = "https://bitbucket.org/";

/// Configuration for a Bitbucket OAuth consumer.
#[derive(Clone)]
pub struct BitbucketConfig {
	/// OAuth consumer key
	client_id: String,
	/// OAuth consumer secret
	client_secret: SecretString,
	/// REST 2.0 root
	api_url: Url,
	/// Web UI and OAuth endpoints
	site_url: Url,
	request_timeout: Duration,
	refresh_margin: Duration,
}

impl std::fmt::Debug for BitbucketConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BitbucketConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("api_url", &self.api_url.as_str())
			.field("site_url", &self.site_url.as_str())
			.field("request_timeout", &self.request_timeout)
			.finish()
	}
}

impl BitbucketConfig {
	pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret,
			api_url: Url::parse(DEFAULT_API_URL).expect("default URL is valid"),
			site_url: Url::parse(DEFAULT_SITE_URL).expect("default URL is valid"),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			refresh_margin: DEFAULT_REFRESH_MARGIN,
		}
	}

	/// Create configuration from environment variables.
	///
	/// Required:
	/// - `GITBRIDGE_BITBUCKET_CLIENT_ID`: OAuth consumer key
	/// - `GITBRIDGE_BITBUCKET_CLIENT_SECRET` (or `_FILE`): consumer secret
	///
	/// Optional:
	/// - `GITBRIDGE_BITBUCKET_TIMEOUT_SECS`
	pub fn from_env() -> Result<Self, ConfigError> {
		let client_id = env::var("GITBRIDGE_BITBUCKET_CLIENT_ID")
			.map_err(|_| ConfigError::missing("GITBRIDGE_BITBUCKET_CLIENT_ID"))?;
		let client_secret = require_secret_env("GITBRIDGE_BITBUCKET_CLIENT_SECRET")?;

		let mut config = Self::new(client_id, client_secret);
		if let Some(secs) = env_parse::<u64>("GITBRIDGE_BITBUCKET_TIMEOUT_SECS")? {
			config.request_timeout = Duration::from_secs(secs);
		}
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.is_empty() {
			return Err(ConfigError::invalid("bitbucket.client_id", "cannot be empty"));
		}
		if self.client_secret.expose().is_empty() {
			return Err(ConfigError::invalid(
				"bitbucket.client_secret",
				"cannot be empty",
			));
		}
		Ok(())
	}

	/// Override the REST root. Invalid URLs log a warning and keep the
	/// previous value.
	pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
		let url_str = url.into();
		match validate_base_url("bitbucket.api_url", &url_str) {
			Ok(validated) => self.api_url = validated,
			Err(e) => {
				warn!(error = %e, url = %url_str, "Invalid api_url in with_api_url, keeping previous value");
			}
		}
		self
	}

	/// Point both roots at a mock server without the HTTPS rule.
	#[cfg(test)]
	pub(crate) fn with_mock_server(mut self, uri: &str) -> Self {
		let root = format!("{}/", uri.trim_end_matches('/'));
		self.site_url = Url::parse(&root).unwrap();
		self.api_url = self.site_url.join("2.0/").unwrap();
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = timeout;
		self
	}

	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin;
		self
	}

	pub fn api_url(&self) -> &Url {
		&self.api_url
	}

	pub fn site_url(&self) -> &Url {
		&self.site_url
	}

	pub fn request_timeout(&self) -> Duration {
		self.request_timeout
	}

	pub fn refresh_margin(&self) -> Duration {
		self.refresh_margin
	}

	/// Bitbucket authenticates the consumer with HTTP basic auth on the
	/// token endpoint. Scopes are fixed on the consumer itself.
	pub fn oauth_client(&self) -> Result<OAuthClient, ConfigError> {
		let join = |path: &str| {
			self
				.site_url
				.join(path)
				.map_err(|e| ConfigError::invalid("bitbucket.site_url", e.to_string()))
		};
		Ok(OAuthClient::new(
			self.client_id.clone(),
			self.client_secret.clone(),
			join("site/oauth2/authorize")?,
			join("site/oauth2/access_token")?,
			ClientAuth::Basic,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> BitbucketConfig {
		BitbucketConfig::new("consumer-key", SecretString::new("consumer-secret".to_string()))
	}

	#[test]
	fn defaults_to_bitbucket_cloud() {
		let config = config();
		assert_eq!(config.api_url().as_str(), "https://api.bitbucket.org/2.0/");
		assert_eq!(config.site_url().as_str(), "https://bitbucket.org/");
	}

	#[test]
	fn oauth_client_uses_site_endpoints() {
		let client = config().oauth_client().unwrap();
		assert_eq!(
			client.token_url().as_str(),
			"https://bitbucket.org/site/oauth2/access_token"
		);
		assert_eq!(
			client.authorization_url("t"),
			"https://bitbucket.org/site/oauth2/authorize?client_id=consumer-key&response_type=code&state=t"
		);
	}

	#[test]
	fn insecure_api_url_is_ignored() {
		let config = config().with_api_url("http://api.bitbucket.org/2.0");
		assert_eq!(config.api_url().as_str(), "https://api.bitbucket.org/2.0/");
	}

	#[test]
	fn empty_secret_is_invalid() {
		let config = BitbucketConfig::new("key", SecretString::new(String::new()));
		assert!(config.validate().is_err());
	}

	#[test]
	fn debug_redacts_secret() {
		assert!(!format!("{:?}", config()).contains("consumer-secret"));
	}
}
