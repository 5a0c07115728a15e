// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! One entry point for GitHub, GitLab and Bitbucket.
//!
//! Build a [`ProviderRegistry`] once from an [`ScmConfig`], then ask it for
//! an [`ScmClient`] per installation:
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use gitbridge_scm::{InstallationId, ProviderKind, ProviderRegistry, ScmConfig};
//!
//! let config = ScmConfig::from_toml_file("gitbridge.toml")?;
//! let registry = ProviderRegistry::from_config(&config)?;
//! let client = registry.get_provider(ProviderKind::GitHub, InstallationId::new("123"))?;
//! let page = client.list_repositories(1, 30).await?;
//! println!("{} repositories", page.total_repos);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use client::ScmClient;
pub use config::{config_error, InstallationConfig, ScmConfig};
pub use registry::{ProviderRegistry, ProviderRegistryBuilder};

pub use gitbridge_common_config::ConfigError;
pub use gitbridge_common_http::RetryConfig;
pub use gitbridge_scm_auth::OAuthGrant;
pub use gitbridge_scm_core::{
	ErrorKind, FullName, GitProvider, InstallationId, OrganizationType, ProviderKind,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
	Result, ScmError, MAX_PAGE_SIZE,
};
