// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! The caller-facing handle for one installation on one backend.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use gitbridge_common_http::{retry_with_budget, Idempotency, RetryBudget, RetryConfig};
use gitbridge_scm_core::{
	FullName, GitProvider, InstallationId, PageRequest, ProviderKind, PullRequestRequest,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
	Result, ScmError,
};
use tracing::{info, instrument, warn};

/// An adapter bound to an installation, applying the retry policy to every
/// call.
///
/// - Rate limits and transient failures go through [`retry_with_budget`]
///   under the registry's [`RetryConfig`]; reads are idempotent, pull request
///   creation is not.
/// - An `AuthExpired` failure drops the cached lease and repeats the call
///   exactly once. A second `AuthExpired` reaches the caller. Both passes
///   draw on one rate-limit budget.
///
/// Arguments are validated before any request is made.
#[derive(Clone)]
pub struct ScmClient {
	provider: Arc<dyn GitProvider>,
	installation: InstallationId,
	retry: RetryConfig,
}

impl fmt::Debug for ScmClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ScmClient")
			.field("provider", &self.provider.kind())
			.field("installation", &self.installation)
			.finish()
	}
}

impl ScmClient {
	pub fn new(
		provider: Arc<dyn GitProvider>,
		installation: InstallationId,
		retry: RetryConfig,
	) -> Self {
		Self {
			provider,
			installation,
			retry,
		}
	}

	pub fn kind(&self) -> ProviderKind {
		self.provider.kind()
	}

	pub fn installation(&self) -> &InstallationId {
		&self.installation
	}

	pub fn installation_url(&self, state: &str) -> String {
		self.provider.installation_url(state)
	}

	async fn call<T, F, Fut>(&self, idempotency: Idempotency, f: F) -> Result<T>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut budget = RetryBudget::default();
		match retry_with_budget(&self.retry, idempotency, &mut budget, &f).await {
			Err(err) if err.is_auth_expired() => {
				warn!(error = %err, "Credential rejected; renewing once");
				self.provider.invalidate_credentials(&self.installation).await;
				retry_with_budget(&self.retry, idempotency, &mut budget, &f).await
			}
			other => other,
		}
	}

	#[instrument(skip(self), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn get_organization(&self) -> Result<RemoteOrganization> {
		self
			.call(Idempotency::Idempotent, || {
				self.provider.get_organization(&self.installation)
			})
			.await
	}

	/// `page` is 1-indexed; `page_size` is between 1 and 100.
	#[instrument(skip(self), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn list_repositories(&self, page: u32, page_size: u32) -> Result<RemoteRepositoryPage> {
		let page = PageRequest::new(page, page_size)?;
		self
			.call(Idempotency::Idempotent, || {
				self.provider.list_repositories(&self.installation, page)
			})
			.await
	}

	#[instrument(skip(self), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn get_repository(&self, full_name: &str) -> Result<RemoteRepository> {
		let full_name = FullName::parse(full_name)?;
		self
			.call(Idempotency::Idempotent, || {
				self.provider.get_repository(&self.installation, &full_name)
			})
			.await
	}

	/// `git_ref` defaults to the repository's default branch.
	#[instrument(skip(self), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn get_file(
		&self,
		full_name: &str,
		path: &str,
		git_ref: Option<&str>,
	) -> Result<RemoteFile> {
		let full_name = FullName::parse(full_name)?;
		let path = validate_file_path(path)?;
		let git_ref = git_ref.map(str::trim).filter(|r| !r.is_empty());
		self
			.call(Idempotency::Idempotent, || {
				self
					.provider
					.get_file(&self.installation, &full_name, path, git_ref)
			})
			.await
	}

	#[instrument(skip(self, title, body), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn create_pull_request(
		&self,
		full_name: &str,
		source_branch: &str,
		target_branch: &str,
		title: &str,
		body: &str,
	) -> Result<PullRequestResult> {
		let request = PullRequestRequest::new(
			FullName::parse(full_name)?,
			source_branch,
			target_branch,
			title,
			body,
		)?;
		let result = self
			.call(Idempotency::NonIdempotent, || {
				self.provider.create_pull_request(&self.installation, &request)
			})
			.await?;
		info!(url = %result.url, "Pull request opened");
		Ok(result)
	}

	/// Disconnect the installation. Never retried.
	#[instrument(skip(self), fields(provider = %self.kind(), installation = %self.installation))]
	pub async fn disconnect(&self) -> Result<()> {
		self.provider.disconnect(&self.installation).await?;
		info!("Installation disconnected");
		Ok(())
	}
}

/// Repository-relative path with no empty, `.` or `..` segments.
fn validate_file_path(path: &str) -> Result<&str> {
	let trimmed = path.trim().trim_matches('/');
	if trimmed.is_empty() {
		return Err(ScmError::validation("file path is required"));
	}
	if trimmed
		.split('/')
		.any(|segment| segment.is_empty() || segment == "." || segment == "..")
	{
		return Err(ScmError::validation(format!("invalid file path '{path}'")));
	}
	Ok(trimmed)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::FakeProvider;
	use gitbridge_scm_core::ErrorKind;
	use std::time::Duration;

	fn retry_config() -> RetryConfig {
		RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(10),
			max_delay: Duration::from_millis(100),
			backoff_factor: 2.0,
			jitter: false,
			max_rate_limit_wait: Duration::from_secs(5),
			max_rate_limit_retries: 3,
		}
	}

	fn client(provider: &Arc<FakeProvider>) -> ScmClient {
		ScmClient::new(provider.clone(), InstallationId::new("123"), retry_config())
	}

	#[tokio::test]
	async fn lists_first_page() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		let page = client(&provider).list_repositories(1, 2).await.unwrap();

		let names: Vec<_> = page.repos.iter().map(|r| r.name.as_str()).collect();
		assert_eq!(names, ["ofek", "test"]);
		assert_eq!(page.total_repos, 2);
		assert_eq!(page.page_size, 2);
		assert_eq!(page.current_page, 1);
	}

	#[tokio::test]
	async fn page_after_last_is_empty_with_same_total() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		let page = client(&provider).list_repositories(2, 2).await.unwrap();
		assert!(page.repos.is_empty());
		assert_eq!(page.total_repos, 2);
	}

	#[tokio::test]
	async fn fetches_file() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		let file = client(&provider)
			.get_file("tupe12334/ofek", "examplePath", None)
			.await
			.unwrap();
		assert_eq!(file.name, "exampleGithubFileName");
		assert_eq!(file.path, "examplePath");
		assert_eq!(file.content, "exampleContent");
		assert_eq!(file.html_url, "exampleHtmlUrl");
	}

	#[tokio::test]
	async fn invalid_arguments_never_reach_the_backend() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		let client = client(&provider);

		for err in [
			client.list_repositories(0, 10).await.unwrap_err(),
			client.list_repositories(1, 0).await.unwrap_err(),
			client.list_repositories(1, 101).await.unwrap_err(),
			client.get_repository("no-slash").await.unwrap_err(),
			client.get_file("a/b", "../etc/passwd", None).await.unwrap_err(),
			client.get_file("a/b", "  ", None).await.unwrap_err(),
			client
				.create_pull_request("a/b", "main", "main", "t", "")
				.await
				.unwrap_err(),
			client
				.create_pull_request("a/b", "", "main", "t", "")
				.await
				.unwrap_err(),
		] {
			assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
		}
		assert_eq!(provider.calls(), 0);
	}

	#[tokio::test]
	async fn auth_expired_renews_once_and_succeeds() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([ScmError::auth_expired("Bad credentials").with_status(401)]);

		let repo = client(&provider).get_repository("tupe12334/ofek").await.unwrap();
		assert_eq!(repo.full_name, "tupe12334/ofek");
		assert_eq!(provider.calls(), 2);
		assert_eq!(provider.invalidations(), 1);
	}

	#[tokio::test]
	async fn second_auth_expired_reaches_caller() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([
			ScmError::auth_expired("Bad credentials").with_status(401),
			ScmError::auth_expired("Bad credentials").with_status(401),
		]);

		let err = client(&provider)
			.get_repository("tupe12334/ofek")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::AuthExpired);
		assert_eq!(err.status(), Some(401));
		assert_eq!(provider.calls(), 2);
		assert_eq!(provider.invalidations(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn transient_read_failures_are_retried() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitLab));
		provider.fail_next([
			ScmError::unavailable(true, "bad gateway").with_status(502),
			ScmError::unavailable(false, "connection refused"),
		]);

		client(&provider).get_organization().await.unwrap();
		assert_eq!(provider.calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn transient_read_failures_give_up_after_max_attempts() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitLab));
		provider.fail_next((0..5).map(|_| ScmError::unavailable(true, "timeout")));

		let err = client(&provider).get_organization().await.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Unavailable);
		assert_eq!(provider.calls(), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn pull_request_is_not_retried_after_ambiguous_failure() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([ScmError::unavailable(true, "timed out reading response")]);

		let err = client(&provider)
			.create_pull_request("tupe12334/ofek", "feature", "main", "t", "")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Unavailable);
		assert_eq!(provider.calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn pull_request_is_retried_once_when_never_sent() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([
			ScmError::unavailable(false, "connection refused"),
			ScmError::unavailable(false, "connection refused"),
		]);

		let err = client(&provider)
			.create_pull_request("tupe12334/ofek", "feature", "main", "t", "")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Unavailable);
		assert_eq!(provider.calls(), 2);
	}

	#[tokio::test]
	async fn existing_pull_request_is_conflict_without_retry() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([ScmError::conflict("A pull request already exists").with_status(422)]);

		let err = client(&provider)
			.create_pull_request("tupe12334/ofek", "feature", "main", "t", "")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::Conflict);
		assert_eq!(provider.calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn rate_limit_waits_for_declared_delay() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::Bitbucket));
		provider.fail_next([ScmError::rate_limited(Some(Duration::from_secs(2)), "slow down")]);

		let started = tokio::time::Instant::now();
		client(&provider).get_repository("tupe12334/ofek").await.unwrap();
		assert!(started.elapsed() >= Duration::from_secs(2));
		assert_eq!(provider.calls(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn rate_limit_beyond_wait_budget_is_surfaced() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([ScmError::rate_limited(
			Some(Duration::from_secs(3600)),
			"quota exhausted",
		)]);

		let err = client(&provider)
			.get_repository("tupe12334/ofek")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::RateLimited);
		assert_eq!(err.retry_after(), Some(Duration::from_secs(3600)));
		assert_eq!(provider.calls(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn renewal_does_not_reset_rate_limit_wait() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.fail_next([
			ScmError::rate_limited(Some(Duration::from_secs(3)), "slow down"),
			ScmError::auth_expired("Bad credentials").with_status(401),
			ScmError::rate_limited(Some(Duration::from_secs(3)), "slow down"),
		]);

		let err = client(&provider)
			.get_repository("tupe12334/ofek")
			.await
			.unwrap_err();
		assert_eq!(err.kind(), ErrorKind::RateLimited);
		assert_eq!(provider.calls(), 3);
		assert_eq!(provider.invalidations(), 1);
	}

	#[tokio::test]
	async fn non_retryable_kinds_surface_immediately() {
		for err in [
			ScmError::not_found("Not Found").with_status(404),
			ScmError::forbidden("Resource not accessible by integration").with_status(403),
			ScmError::validation("Unprocessable").with_status(422),
		] {
			let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
			let kind = err.kind();
			provider.fail_next([err]);

			let surfaced = client(&provider)
				.get_repository("tupe12334/ofek")
				.await
				.unwrap_err();
			assert_eq!(surfaced.kind(), kind);
			assert_eq!(provider.calls(), 1);
			assert_eq!(provider.invalidations(), 0);
		}
	}

	#[tokio::test]
	async fn repository_reads_are_idempotent() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		let client = client(&provider);
		let first = client.get_repository("tupe12334/ofek").await.unwrap();
		let second = client.get_repository("tupe12334/ofek").await.unwrap();
		assert_eq!(first, second);
	}

	#[tokio::test(start_paused = true)]
	async fn cancellation_is_not_retried() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		provider.hang();

		let result = tokio::time::timeout(
			Duration::from_secs(1),
			client(&provider).get_repository("tupe12334/ofek"),
		)
		.await;
		assert!(result.is_err());
		assert_eq!(provider.calls(), 1);
		assert_eq!(provider.invalidations(), 0);
	}

	#[tokio::test]
	async fn disconnect_reaches_provider() {
		let provider = Arc::new(FakeProvider::new(ProviderKind::GitHub));
		client(&provider).disconnect().await.unwrap();
		assert_eq!(provider.disconnects(), 1);
	}

	#[test]
	fn file_path_is_normalized() {
		assert_eq!(validate_file_path("/docs/readme.md").unwrap(), "docs/readme.md");
		assert!(validate_file_path("docs//readme.md").is_err());
		assert!(validate_file_path("./readme.md").is_err());
	}
}
