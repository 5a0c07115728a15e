// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration for the GitLab adapter.

use std::env;
use std::time::Duration;

use gitbridge_common_config::{
	env_parse, require_secret_env, validate_base_url, ConfigError, SecretString,
};
use gitbridge_common_http::DEFAULT_REQUEST_TIMEOUT;
use gitbridge_scm_auth::{ClientAuth, OAuthClient, DEFAULT_REFRESH_MARGIN};
use reqwest::Url;
use tracing::warn;

const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4/";
const API_PATH: &str = "api/v4/";
const DEFAULT_SCOPES: &[&str] = &["api"];

/// Configuration for a GitLab instance and the OAuth application
/// installations connect through.
#[derive(Clone)]
pub struct GitlabConfig {
	client_id: String,
	client_secret: SecretString,
	redirect_uri: String,
	/// REST v4 root, always ending in `/api/v4/`
	base_url: Url,
	scopes: Vec<String>,
	request_timeout: Duration,
	refresh_margin: Duration,
}

impl std::fmt::Debug for GitlabConfig {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GitlabConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("redirect_uri", &self.redirect_uri)
			.field("base_url", &self.base_url.as_str())
			.field("scopes", &self.scopes)
			.field("request_timeout", &self.request_timeout)
			.finish()
	}
}

impl GitlabConfig {
	/// Create a configuration against gitlab.com.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: SecretString,
		redirect_uri: impl Into<String>,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret,
			redirect_uri: redirect_uri.into(),
			base_url: Url::parse(DEFAULT_BASE_URL).expect("default URL is valid"),
			scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
			refresh_margin: DEFAULT_REFRESH_MARGIN,
		}
	}

	/// Create configuration from environment variables.
	///
	/// Required:
	/// - `GITBRIDGE_GITLAB_CLIENT_ID`
	/// - `GITBRIDGE_GITLAB_CLIENT_SECRET` (or `_FILE`)
	/// - `GITBRIDGE_GITLAB_REDIRECT_URI`
	///
	/// Optional:
	/// - `GITBRIDGE_GITLAB_BASE_URL`: instance or API root (defaults to
	///   gitlab.com, must be HTTPS)
	/// - `GITBRIDGE_GITLAB_TIMEOUT_SECS`
	pub fn from_env() -> Result<Self, ConfigError> {
		let client_id = env::var("GITBRIDGE_GITLAB_CLIENT_ID")
			.map_err(|_| ConfigError::missing("GITBRIDGE_GITLAB_CLIENT_ID"))?;
		let client_secret = require_secret_env("GITBRIDGE_GITLAB_CLIENT_SECRET")?;
		let redirect_uri = env::var("GITBRIDGE_GITLAB_REDIRECT_URI")
			.map_err(|_| ConfigError::missing("GITBRIDGE_GITLAB_REDIRECT_URI"))?;

		let mut config = Self::new(client_id, client_secret, redirect_uri);
		if let Ok(raw) = env::var("GITBRIDGE_GITLAB_BASE_URL") {
			config.base_url = api_root(validate_base_url("GITBRIDGE_GITLAB_BASE_URL", &raw)?)?;
		}
		if let Some(secs) = env_parse::<u64>("GITBRIDGE_GITLAB_TIMEOUT_SECS")? {
			config.request_timeout = Duration::from_secs(secs);
		}
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.is_empty() {
			return Err(ConfigError::invalid("gitlab.client_id", "cannot be empty"));
		}
		if self.client_secret.expose().is_empty() {
			return Err(ConfigError::invalid("gitlab.client_secret", "cannot be empty"));
		}
		if self.redirect_uri.is_empty() {
			return Err(ConfigError::invalid("gitlab.redirect_uri", "cannot be empty"));
		}
		Ok(())
	}

	/// Point at a self-managed instance. Accepts the instance root or the
	/// `/api/v4` root. Invalid URLs log a warning and keep the previous value.
	pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
		let url_str = url.into();
		match validate_base_url("gitlab.base_url", &url_str).and_then(api_root) {
			Ok(validated) => self.base_url = validated,
			Err(e) => {
				warn!(error = %e, url = %url_str, "Invalid base_url in with_base_url, keeping previous value");
			}
		}
		self
	}

	#[cfg(test)]
	pub(crate) fn with_base_url_unchecked(mut self, url: &str) -> Self {
		let normalized = Url::parse(&format!("{}/", url.trim_end_matches('/'))).unwrap();
		self.base_url = api_root(normalized).unwrap();
		self
	}

	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();
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

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// The instance root that serves the web UI and the OAuth endpoints.
	pub fn web_url(&self) -> Url {
		let mut web = self.base_url.clone();
		let path = web.path().trim_end_matches(API_PATH).to_string();
		web.set_path(&path);
		web
	}

	pub fn request_timeout(&self) -> Duration {
		self.request_timeout
	}

	pub fn refresh_margin(&self) -> Duration {
		self.refresh_margin
	}

	pub(crate) fn client_id(&self) -> &str {
		&self.client_id
	}

	pub(crate) fn client_secret(&self) -> &SecretString {
		&self.client_secret
	}

	/// The OAuth application as the shared refresh exchanger sees it.
	pub fn oauth_client(&self) -> Result<OAuthClient, ConfigError> {
		let web = self.web_url();
		let join = |path: &str| {
			web
				.join(path)
				.map_err(|e| ConfigError::invalid("gitlab.base_url", e.to_string()))
		};
		Ok(OAuthClient::new(
			self.client_id.clone(),
			self.client_secret.clone(),
			join("oauth/authorize")?,
			join("oauth/token")?,
			ClientAuth::RequestBody,
		)
		.with_redirect_uri(self.redirect_uri.clone())
		.with_scopes(self.scopes.clone()))
	}
}

/// Make sure a validated base URL points at the REST v4 root.
fn api_root(url: Url) -> Result<Url, ConfigError> {
	if url.path().ends_with(API_PATH) {
		return Ok(url);
	}
	url
		.join(API_PATH)
		.map_err(|e| ConfigError::invalid("gitlab.base_url", e.to_string()))
}
