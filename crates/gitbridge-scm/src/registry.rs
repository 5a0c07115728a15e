// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use gitbridge_common_config::ConfigError;
use gitbridge_common_http::RetryConfig;
use gitbridge_scm_auth::InMemoryGrantStore;
use gitbridge_scm_bitbucket::BitbucketProvider;
use gitbridge_scm_core::{GitProvider, InstallationId, ProviderKind, Result, ScmError};
use gitbridge_scm_github::GithubProvider;
use gitbridge_scm_gitlab::GitlabProvider;
use tracing::{debug, info, instrument};

use crate::client::ScmClient;
use crate::config::ScmConfig;

/// Read-only map from provider kind to its adapter, built once at startup
/// and shared by every caller.
#[derive(Clone)]
pub struct ProviderRegistry {
	providers: Arc<HashMap<ProviderKind, Arc<dyn GitProvider>>>,
	retry: RetryConfig,
}

impl fmt::Debug for ProviderRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderRegistry")
			.field("providers", &self.kinds())
			.field("retry", &self.retry)
			.finish()
	}
}

impl ProviderRegistry {
	pub fn builder() -> ProviderRegistryBuilder {
		ProviderRegistryBuilder::default()
	}

	/// Build an adapter for every provider section present in `config`,
	/// seeding OAuth adapters with their installations' grants.
	pub fn from_config(config: &ScmConfig) -> std::result::Result<Self, ConfigError> {
		let mut builder = Self::builder().with_retry(config.retry.clone());

		if let Some(github) = &config.github {
			builder = builder.register(Arc::new(GithubProvider::new(github.clone())?));
		}
		if let Some(gitlab) = &config.gitlab {
			let grants = InMemoryGrantStore::with_grants(config.grants_for(ProviderKind::GitLab));
			builder = builder.register(Arc::new(GitlabProvider::new(
				gitlab.clone(),
				Arc::new(grants),
			)?));
		}
		if let Some(bitbucket) = &config.bitbucket {
			let grants = InMemoryGrantStore::with_grants(config.grants_for(ProviderKind::Bitbucket));
			builder = builder.register(Arc::new(BitbucketProvider::new(
				bitbucket.clone(),
				Arc::new(grants),
			)?));
		}

		for installation in &config.installations {
			if !builder.providers.contains_key(&installation.provider) {
				return Err(ConfigError::invalid(
					format!("installations.{}", installation.installation_id),
					format!("provider '{}' is not configured", installation.provider),
				));
			}
		}

		Ok(builder.build())
	}

	/// Bind `installation` to the adapter for `selector`.
	#[instrument(skip(self), fields(selector = %selector, installation = %installation))]
	pub fn get_provider(
		&self,
		selector: ProviderKind,
		installation: InstallationId,
	) -> Result<ScmClient> {
		let provider = self
			.providers
			.get(&selector)
			.ok_or_else(|| ScmError::unsupported_provider(selector.as_str()))?;
		debug!("Resolved provider");
		Ok(ScmClient::new(
			provider.clone(),
			installation,
			self.retry.clone(),
		))
	}

	/// [`Self::get_provider`] for a selector that arrived as text (tenant
	/// configuration, request parameters).
	pub fn get_provider_by_name(
		&self,
		selector: &str,
		installation: InstallationId,
	) -> Result<ScmClient> {
		self.get_provider(selector.parse()?, installation)
	}

	pub fn kinds(&self) -> Vec<ProviderKind> {
		let mut kinds: Vec<_> = self.providers.keys().copied().collect();
		kinds.sort_by_key(|k| k.as_str());
		kinds
	}

	pub fn retry_config(&self) -> &RetryConfig {
		&self.retry
	}
}

#[derive(Default)]
pub struct ProviderRegistryBuilder {
	providers: HashMap<ProviderKind, Arc<dyn GitProvider>>,
	retry: RetryConfig,
}

impl ProviderRegistryBuilder {
	/// Register an adapter under its own [`GitProvider::kind`]. A later
	/// registration for the same kind replaces the earlier one.
	pub fn register(mut self, provider: Arc<dyn GitProvider>) -> Self {
		let kind = provider.kind();
		if self.providers.insert(kind, provider).is_some() {
			debug!(%kind, "Replaced registered provider");
		}
		self
	}

	pub fn with_retry(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn build(self) -> ProviderRegistry {
		let registry = ProviderRegistry {
			providers: Arc::new(self.providers),
			retry: self.retry,
		};
		info!(providers = ?registry.kinds(), "Provider registry initialised");
		registry
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::FakeProvider;
	use gitbridge_common_config::SecretString;
	use gitbridge_scm_core::ErrorKind;
	use gitbridge_scm_gitlab::GitlabConfig;

	#[test]
	fn every_registered_kind_resolves_to_its_adapter() {
		let registry = ProviderRegistry::builder()
			.register(Arc::new(FakeProvider::new(ProviderKind::GitHub)))
			.register(Arc::new(FakeProvider::new(ProviderKind::GitLab)))
			.register(Arc::new(FakeProvider::new(ProviderKind::Bitbucket)))
			.build();

		for kind in ProviderKind::ALL {
			let client = registry.get_provider(kind, InstallationId::new("123")).unwrap();
			assert_eq!(client.kind(), kind);
			assert_eq!(client.installation().as_str(), "123");
		}
	}

	#[test]
	fn unregistered_kind_is_unsupported() {
		let registry = ProviderRegistry::builder()
			.register(Arc::new(FakeProvider::new(ProviderKind::GitHub)))
			.build();

		let err = registry
			.get_provider(ProviderKind::Bitbucket, InstallationId::new("1"))
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnsupportedProvider);
	}

	#[test]
	fn unknown_selector_text_is_unsupported() {
		let registry = ProviderRegistry::builder()
			.register(Arc::new(FakeProvider::new(ProviderKind::GitHub)))
			.build();

		let err = registry
			.get_provider_by_name("perforce", InstallationId::new("1"))
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::UnsupportedProvider);
		assert!(registry
			.get_provider_by_name(" GitHub ", InstallationId::new("1"))
			.is_ok());
	}

	#[test]
	fn registry_is_shareable_across_threads() {
		fn assert_send_sync<T: Send + Sync>() {}
		assert_send_sync::<ProviderRegistry>();
		assert_send_sync::<ScmClient>();
	}

	#[test]
	fn from_config_builds_configured_adapters_only() {
		let config = ScmConfig {
			gitlab: Some(GitlabConfig::new(
				"app",
				SecretString::new("secret".to_string()),
				"https://app.example.com/cb",
			)),
			..ScmConfig::default()
		};
		let registry = ProviderRegistry::from_config(&config).unwrap();
		assert_eq!(registry.kinds(), vec![ProviderKind::GitLab]);
		assert_eq!(
			registry
				.get_provider(ProviderKind::GitHub, InstallationId::new("1"))
				.unwrap_err()
				.kind(),
			ErrorKind::UnsupportedProvider
		);
	}

	#[test]
	fn installation_for_unconfigured_provider_is_rejected() {
		let config = ScmConfig::from_toml_str(
			r#"
[[installations]]
provider = "github"
installation_id = 1
"#,
		)
		.unwrap();
		assert!(matches!(
			ProviderRegistry::from_config(&config),
			Err(ConfigError::Invalid { .. })
		));
	}
}
