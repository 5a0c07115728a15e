// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::error::Result;
use crate::pagination::PageRequest;
use crate::types::{
	FullName, InstallationId, ProviderKind, PullRequestRequest, PullRequestResult, RemoteFile,
	RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
};

/// The operations every hosting backend adapter supports.
///
/// Implementations hold no per-call state and are shared across any number
/// of concurrent callers. Each method performs exactly one logical attempt;
/// retry and credential renewal are applied by the caller-facing client.
///
/// Arguments arrive already validated: `full_name` is well formed, `page`
/// is in range, and pull request branches are present and distinct.
#[async_trait]
pub trait GitProvider: Send + Sync {
	fn kind(&self) -> ProviderKind;

	/// URL a tenant opens to connect a new installation. `state` is echoed
	/// back to the host application's callback.
	fn installation_url(&self, state: &str) -> String;

	/// The account the installation's grant is bound to.
	async fn get_organization(&self, installation: &InstallationId) -> Result<RemoteOrganization>;

	/// One page of the repositories visible to the installation. A page past
	/// the end is empty and keeps the query's total.
	async fn list_repositories(
		&self,
		installation: &InstallationId,
		page: PageRequest,
	) -> Result<RemoteRepositoryPage>;

	async fn get_repository(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<RemoteRepository>;

	/// Fetch a file at `git_ref`, or at the default branch when `None`.
	async fn get_file(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
		path: &str,
		git_ref: Option<&str>,
	) -> Result<RemoteFile>;

	async fn create_pull_request(
		&self,
		installation: &InstallationId,
		request: &PullRequestRequest,
	) -> Result<PullRequestResult>;

	/// Drop the cached lease after the backend rejected it, so the next call
	/// performs a fresh exchange.
	async fn invalidate_credentials(&self, installation: &InstallationId);

	/// Remove the installation backend-side where supported and revoke its
	/// credentials locally.
	async fn disconnect(&self, installation: &InstallationId) -> Result<()>;
}
