// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Provider and installation configuration, from a TOML file or the
//! environment.
//!
//! ```toml
//! [retry]
//! max_attempts = 3
//! max_rate_limit_wait_ms = 60000
//!
//! [github]
//! app_id = 4242
//! private_key_file = "/run/secrets/github-app.pem"
//!
//! [gitlab]
//! client_id = "..."
//! client_secret_file = "/run/secrets/gitlab-secret"
//! redirect_uri = "https://app.example.com/connect/gitlab"
//!
//! [[installations]]
//! provider = "github"
//! installation_id = 123
//!
//! [[installations]]
//! provider = "gitlab"
//! installation_id = "acme"
//! refresh_token = "..."
//! ```

use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use gitbridge_common_config::{env_parse, validate_base_url, ConfigError, SecretString};
use gitbridge_common_http::RetryConfig;
use gitbridge_scm_auth::OAuthGrant;
use gitbridge_scm_bitbucket::BitbucketConfig;
use gitbridge_scm_core::{InstallationId, ProviderKind, ScmError};
use gitbridge_scm_github::GithubConfig;
use gitbridge_scm_gitlab::GitlabConfig;
use serde::Deserialize;
use tracing::{debug, info};

/// One tenant connection: which backend, which installation, and the grant
/// material OAuth backends need.
#[derive(Debug, Clone)]
pub struct InstallationConfig {
	pub provider: ProviderKind,
	pub installation_id: InstallationId,
	/// Always `None` for GitHub, whose credentials come from the app.
	pub grant: Option<OAuthGrant>,
}

#[derive(Debug, Clone, Default)]
pub struct ScmConfig {
	pub retry: RetryConfig,
	pub github: Option<GithubConfig>,
	pub gitlab: Option<GitlabConfig>,
	pub bitbucket: Option<BitbucketConfig>,
	pub installations: Vec<InstallationConfig>,
}

impl ScmConfig {
	pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		debug!(path = %path.display(), "loading config file");
		let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&content).map_err(|e| match e {
			ConfigError::Parse { message, .. } => ConfigError::Parse {
				path: path.to_path_buf(),
				message,
			},
			other => other,
		})?;
		info!(
			path = %path.display(),
			installations = config.installations.len(),
			"Loaded SCM configuration"
		);
		Ok(config)
	}

	pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
		let file: ConfigFile = toml::from_str(content).map_err(|e| ConfigError::Parse {
			path: PathBuf::from("<inline>"),
			message: e.to_string(),
		})?;
		file.resolve()
	}

	/// Build provider sections from `GITBRIDGE_*` variables. A provider is
	/// enabled when its identifying variable is set. Installations are only
	/// read from files.
	pub fn from_env() -> Result<Self, ConfigError> {
		let github = match env::var("GITBRIDGE_GITHUB_APP_ID") {
			Ok(_) => Some(GithubConfig::from_env()?),
			Err(_) => None,
		};
		let gitlab = match env::var("GITBRIDGE_GITLAB_CLIENT_ID") {
			Ok(_) => Some(GitlabConfig::from_env()?),
			Err(_) => None,
		};
		let bitbucket = match env::var("GITBRIDGE_BITBUCKET_CLIENT_ID") {
			Ok(_) => Some(BitbucketConfig::from_env()?),
			Err(_) => None,
		};

		let mut retry = RetryConfig::default();
		if let Some(attempts) = env_parse::<u32>("GITBRIDGE_RETRY_MAX_ATTEMPTS")? {
			retry.max_attempts = attempts;
		}
		if let Some(ms) = env_parse::<u64>("GITBRIDGE_RETRY_MAX_RATE_LIMIT_WAIT_MS")? {
			retry.max_rate_limit_wait = Duration::from_millis(ms);
		}

		Ok(Self {
			retry: checked_retry(retry)?,
			github,
			gitlab,
			bitbucket,
			installations: Vec::new(),
		})
	}

	pub fn installation(&self, installation_id: &InstallationId) -> Option<&InstallationConfig> {
		self
			.installations
			.iter()
			.find(|i| &i.installation_id == installation_id)
	}

	/// Grants for every installation of `provider`.
	pub fn grants_for(
		&self,
		provider: ProviderKind,
	) -> impl Iterator<Item = (InstallationId, OAuthGrant)> + '_ {
		self.installations.iter().filter_map(move |i| match &i.grant {
			Some(grant) if i.provider == provider => Some((i.installation_id.clone(), grant.clone())),
			_ => None,
		})
	}
}

/// Configuration failures crossing into the provider error taxonomy.
pub fn config_error(err: ConfigError) -> ScmError {
	match err {
		ConfigError::UnsupportedProvider(provider) => ScmError::unsupported_provider(provider),
		other => ScmError::validation(other.to_string()),
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
	#[serde(default)]
	retry: RetryConfig,
	github: Option<GithubSection>,
	gitlab: Option<GitlabSection>,
	bitbucket: Option<BitbucketSection>,
	#[serde(default)]
	installations: Vec<InstallationSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GithubSection {
	app_id: u64,
	private_key: Option<SecretString>,
	private_key_file: Option<PathBuf>,
	app_slug: Option<String>,
	base_url: Option<String>,
	timeout_secs: Option<u64>,
	refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GitlabSection {
	client_id: String,
	client_secret: Option<SecretString>,
	client_secret_file: Option<PathBuf>,
	redirect_uri: String,
	base_url: Option<String>,
	scopes: Option<Vec<String>>,
	timeout_secs: Option<u64>,
	refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BitbucketSection {
	client_id: String,
	client_secret: Option<SecretString>,
	client_secret_file: Option<PathBuf>,
	api_url: Option<String>,
	timeout_secs: Option<u64>,
	refresh_margin_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallationSection {
	provider: String,
	installation_id: InstallationId,
	access_token: Option<SecretString>,
	refresh_token: Option<SecretString>,
}

/// Inline value or file contents; exactly one must be given.
fn secret(
	field: &str,
	inline: Option<SecretString>,
	file: Option<PathBuf>,
) -> Result<SecretString, ConfigError> {
	match (inline, file) {
		(Some(value), None) => Ok(value),
		(None, Some(path)) => {
			let content = std::fs::read_to_string(&path)
				.map_err(|source| ConfigError::Io { path, source })?;
			let trimmed = content.strip_suffix('\n').unwrap_or(&content);
			Ok(SecretString::new(trimmed.to_string()))
		}
		(Some(_), Some(_)) => Err(ConfigError::invalid(
			field,
			format!("set either {field} or {field}_file, not both"),
		)),
		(None, None) => Err(ConfigError::invalid(
			field,
			format!("one of {field} or {field}_file is required"),
		)),
	}
}

fn checked_url(field: &str, raw: &str) -> Result<String, ConfigError> {
	validate_base_url(field, raw)?;
	Ok(raw.to_string())
}

impl GithubSection {
	fn resolve(self) -> Result<GithubConfig, ConfigError> {
		let key = secret("github.private_key", self.private_key, self.private_key_file)?;
		let mut config = GithubConfig::new(self.app_id, key.expose().clone());
		if let Some(slug) = self.app_slug {
			config = config.with_app_slug(slug);
		}
		if let Some(url) = self.base_url {
			config = config.with_base_url(checked_url("github.base_url", &url)?);
		}
		if let Some(secs) = self.timeout_secs {
			config = config.with_request_timeout(Duration::from_secs(secs));
		}
		if let Some(secs) = self.refresh_margin_secs {
			config = config.with_refresh_margin(Duration::from_secs(secs));
		}
		Ok(config)
	}
}

impl GitlabSection {
	fn resolve(self) -> Result<GitlabConfig, ConfigError> {
		let client_secret = secret(
			"gitlab.client_secret",
			self.client_secret,
			self.client_secret_file,
		)?;
		let mut config = GitlabConfig::new(self.client_id, client_secret, self.redirect_uri);
		if let Some(url) = self.base_url {
			config = config.with_base_url(checked_url("gitlab.base_url", &url)?);
		}
		if let Some(scopes) = self.scopes {
			config = config.with_scopes(scopes);
		}
		if let Some(secs) = self.timeout_secs {
			config = config.with_request_timeout(Duration::from_secs(secs));
		}
		if let Some(secs) = self.refresh_margin_secs {
			config = config.with_refresh_margin(Duration::from_secs(secs));
		}
		config.validate()?;
		Ok(config)
	}
}

impl BitbucketSection {
	fn resolve(self) -> Result<BitbucketConfig, ConfigError> {
		let client_secret = secret(
			"bitbucket.client_secret",
			self.client_secret,
			self.client_secret_file,
		)?;
		let mut config = BitbucketConfig::new(self.client_id, client_secret);
		if let Some(url) = self.api_url {
			config = config.with_api_url(checked_url("bitbucket.api_url", &url)?);
		}
		if let Some(secs) = self.timeout_secs {
			config = config.with_request_timeout(Duration::from_secs(secs));
		}
		if let Some(secs) = self.refresh_margin_secs {
			config = config.with_refresh_margin(Duration::from_secs(secs));
		}
		config.validate()?;
		Ok(config)
	}
}

impl InstallationSection {
	fn resolve(self) -> Result<InstallationConfig, ConfigError> {
		let provider: ProviderKind = self
			.provider
			.parse()
			.map_err(|_| ConfigError::UnsupportedProvider(self.provider.clone()))?;
		let field = format!("installations.{}", self.installation_id);

		let grant = match (provider, self.access_token, self.refresh_token) {
			(ProviderKind::GitHub, None, None) => None,
			(ProviderKind::GitHub, _, _) => {
				return Err(ConfigError::invalid(
					field,
					"GitHub installations authenticate through the app and take no tokens",
				))
			}
			(_, Some(token), None) => Some(OAuthGrant::AccessToken(token)),
			(_, None, Some(token)) => Some(OAuthGrant::RefreshToken(token)),
			(_, Some(_), Some(_)) => {
				return Err(ConfigError::invalid(
					field,
					"set either access_token or refresh_token, not both",
				))
			}
			(_, None, None) => {
				return Err(ConfigError::invalid(
					field,
					"access_token or refresh_token is required",
				))
			}
		};

		Ok(InstallationConfig {
			provider,
			installation_id: self.installation_id,
			grant,
		})
	}
}

fn checked_retry(retry: RetryConfig) -> Result<RetryConfig, ConfigError> {
	retry
		.validate()
		.map_err(|e| ConfigError::invalid(format!("retry.{}", e.field), e.reason))?;
	Ok(retry)
}

impl ConfigFile {
	fn resolve(self) -> Result<ScmConfig, ConfigError> {
		let mut seen = HashSet::new();
		let mut installations = Vec::with_capacity(self.installations.len());
		for section in self.installations {
			let installation = section.resolve()?;
			if !seen.insert(installation.installation_id.clone()) {
				return Err(ConfigError::invalid(
					format!("installations.{}", installation.installation_id),
					"installation listed more than once",
				));
			}
			installations.push(installation);
		}

		Ok(ScmConfig {
			retry: checked_retry(self.retry)?,
			github: self.github.map(GithubSection::resolve).transpose()?,
			gitlab: self.gitlab.map(GitlabSection::resolve).transpose()?,
			bitbucket: self.bitbucket.map(BitbucketSection::resolve).transpose()?,
			installations,
		})
	}
}
