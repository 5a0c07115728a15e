// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bitbucket Cloud implementation of [`GitProvider`].

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use gitbridge_common_config::ConfigError;
use gitbridge_scm_auth::{AuthManager, GrantStore, OAuthClient, OAuthRefreshExchanger};
use gitbridge_scm_core::{
	http, FullName, GitProvider, InstallationId, PageRequest, ProviderKind, PullRequestRequest,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
	Result, ScmError, MAX_PAGE_SIZE,
};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use tracing::{debug, info, instrument, warn};

use crate::config::BitbucketConfig;
use crate::types::{
	BranchRef, CreatePullRequest, Paginated, PullRequest, Repository, RepositoryPermission,
	SourceMeta, User,
};

/// Adapter for Bitbucket Cloud (REST 2.0) through an OAuth consumer.
pub struct BitbucketProvider {
	http_client: Client,
	config: BitbucketConfig,
	oauth: OAuthClient,
	auth: Arc<AuthManager>,
}

impl BitbucketProvider {
	pub fn new(
		config: BitbucketConfig,
		grants: Arc<dyn GrantStore>,
	) -> std::result::Result<Self, ConfigError> {
		config.validate()?;
		let http_client = gitbridge_common_http::new_client_with_timeout(config.request_timeout())
			.map_err(|e| ConfigError::invalid("bitbucket.http_client", e.to_string()))?;
		let oauth = config.oauth_client()?;

		let exchanger = OAuthRefreshExchanger::new(http_client.clone(), oauth.clone(), grants);
		let auth = Arc::new(
			AuthManager::new(Arc::new(exchanger)).with_refresh_margin(config.refresh_margin()),
		);

		info!(api_url = %config.api_url(), "Created Bitbucket provider");
		Ok(Self {
			http_client,
			config,
			oauth,
			auth,
		})
	}

	pub fn auth_manager(&self) -> &Arc<AuthManager> {
		&self.auth
	}

	async fn send(
		&self,
		installation: &InstallationId,
		method: Method,
		path: &str,
		build: impl FnOnce(RequestBuilder) -> RequestBuilder,
	) -> Result<Response> {
		let url = self
			.config
			.api_url()
			.join(path)
			.map_err(|e| ScmError::validation(format!("invalid Bitbucket URL for '{path}': {e}")))?;
		self.send_url(installation, method, url, build).await
	}

	async fn send_url(
		&self,
		installation: &InstallationId,
		method: Method,
		url: Url,
		build: impl FnOnce(RequestBuilder) -> RequestBuilder,
	) -> Result<Response> {
		let lease = self.auth.acquire(installation).await?;
		debug!(url = %url, %method, "Sending Bitbucket request");

		let request = self
			.http_client
			.request(method, url)
			.bearer_auth(lease.token().expose())
			.header(ACCEPT, "application/json");
		let response = build(request).send().await.map_err(http::from_transport)?;
		http::check(response).await
	}

	/// Follow a `next` link, refusing to send the token anywhere but the API.
	fn next_url(&self, next: &str) -> Result<Url> {
		let url = Url::parse(next).map_err(http::malformed)?;
		if !url.as_str().starts_with(self.config.api_url().as_str()) {
			return Err(http::malformed(format!("pagination link leaves the API: {next}")));
		}
		Ok(url)
	}

	async fn fetch_repository(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<Repository> {
		let response = self
			.send(installation, Method::GET, &repo_path(full_name), |req| req)
			.await?;
		http::json_body(response).await
	}

	/// Full names among `repos` on which the installation's user is admin.
	#[instrument(skip(self, full_names), fields(installation = %installation, count = full_names.len()))]
	async fn admin_repositories(
		&self,
		installation: &InstallationId,
		full_names: &[&str],
	) -> Result<HashSet<String>> {
		let mut admin = HashSet::new();
		if full_names.is_empty() {
			return Ok(admin);
		}

		let query = permission_query(full_names);
		let pagelen = MAX_PAGE_SIZE.to_string();
		let mut response = self
			.send(installation, Method::GET, "user/permissions/repositories", |req| {
				req.query(&[("q", query.as_str()), ("pagelen", pagelen.as_str())])
			})
			.await?;

		loop {
			let page: Paginated<RepositoryPermission> = http::json_body(response).await?;
			admin.extend(
				page
					.values
					.into_iter()
					.filter(|p| p.permission == "admin")
					.map(|p| p.repository.full_name),
			);
			let Some(next) = page.next else { break };
			response = self
				.send_url(installation, Method::GET, self.next_url(&next)?, |req| req)
				.await?;
		}
		Ok(admin)
	}

	/// Count member repositories by walking the listing at the largest page
	/// length.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn count_repositories(&self, installation: &InstallationId) -> Result<u64> {
		let pagelen = MAX_PAGE_SIZE.to_string();
		let mut response = self
			.send(installation, Method::GET, "repositories", |req| {
				req.query(&[("role", "member"), ("pagelen", pagelen.as_str())])
			})
			.await?;

		let mut total = 0u64;
		loop {
			let page: Paginated<serde_json::Value> = http::json_body(response).await?;
			total += page.values.len() as u64;
			let Some(next) = page.next else { break };
			response = self
				.send_url(installation, Method::GET, self.next_url(&next)?, |req| req)
				.await?;
		}
		debug!(total, "Counted repositories by walking the listing");
		Ok(total)
	}
}

fn repo_path(full_name: &FullName) -> String {
	format!(
		"repositories/{}/{}",
		urlencoding::encode(full_name.owner()),
		urlencoding::encode(full_name.name())
	)
}

fn encode_path(path: &str) -> String {
	path
		.split('/')
		.filter(|s| !s.is_empty())
		.map(|s| urlencoding::encode(s).into_owned())
		.collect::<Vec<_>>()
		.join("/")
}

/// BBQL filter selecting the given repositories.
fn permission_query(full_names: &[&str]) -> String {
	full_names
		.iter()
		.map(|name| format!("repository.full_name=\"{}\"", name.replace('"', "")))
		.collect::<Vec<_>>()
		.join(" OR ")
}

/// Bitbucket reports a duplicate pull request as a 400 naming the existing
/// one.
fn classify_pull_request_error(err: ScmError) -> ScmError {
	match err {
		ScmError::Validation {
			status: Some(400),
			message,
		} if message.to_lowercase().contains("already") => {
			ScmError::conflict(message).with_status(400)
		}
		other => other,
	}
}

#[async_trait]
impl GitProvider for BitbucketProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::Bitbucket
	}

	fn installation_url(&self, state: &str) -> String {
		self.oauth.authorization_url(state)
	}

	/// `GET /user`
	#[instrument(skip(self), fields(installation = %installation))]
	async fn get_organization(&self, installation: &InstallationId) -> Result<RemoteOrganization> {
		let response = self.send(installation, Method::GET, "user", |req| req).await?;
		let user: User = http::json_body(response).await?;
		user
			.into_organization()
			.ok_or_else(|| ScmError::not_found(format!("installation {installation} has no account")))
	}

	/// `GET /repositories?role=member`
	#[instrument(skip(self), fields(installation = %installation, page = page.page(), page_size = page.page_size()))]
	async fn list_repositories(
		&self,
		installation: &InstallationId,
		page: PageRequest,
	) -> Result<RemoteRepositoryPage> {
		let (pagelen, page_no) = (page.page_size().to_string(), page.page().to_string());
		let response = self
			.send(installation, Method::GET, "repositories", |req| {
				req.query(&[
					("role", "member"),
					("pagelen", pagelen.as_str()),
					("page", page_no.as_str()),
				])
			})
			.await?;
		let listing: Paginated<Repository> = http::json_body(response).await?;

		let full_names: Vec<&str> = listing.values.iter().map(|r| r.full_name.as_str()).collect();
		let admin = self.admin_repositories(installation, &full_names).await?;
		let repos: Vec<RemoteRepository> = listing
			.values
			.into_iter()
			.map(|repo| {
				let is_admin = admin.contains(&repo.full_name);
				repo.into_remote(is_admin)
			})
			.collect();

		let total = match listing.size {
			Some(size) => size,
			None => self.count_repositories(installation).await?,
		};
		debug!(total, count = repos.len(), "Repositories listed");
		Ok(page.assemble(repos, total))
	}

	/// `GET /repositories/{workspace}/{slug}`
	#[instrument(skip(self), fields(installation = %installation, full_name = %full_name))]
	async fn get_repository(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<RemoteRepository> {
		let repo = self.fetch_repository(installation, full_name).await?;
		let admin = self
			.admin_repositories(installation, &[repo.full_name.as_str()])
			.await?
			.contains(&repo.full_name);
		Ok(repo.into_remote(admin))
	}

	/// `GET /repositories/{workspace}/{slug}/src/{ref}/{path}`, once with
	/// `format=meta` to reject directories and once for the raw body.
	#[instrument(skip(self), fields(installation = %installation, full_name = %full_name))]
	async fn get_file(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
		path: &str,
		git_ref: Option<&str>,
	) -> Result<RemoteFile> {
		let git_ref = match git_ref {
			Some(r) => r.to_string(),
			None => self
				.fetch_repository(installation, full_name)
				.await?
				.mainbranch
				.map(|b| b.name)
				.ok_or_else(|| ScmError::not_found(format!("{full_name} has no main branch")))?,
		};

		let src_path = format!(
			"{}/src/{}/{}",
			repo_path(full_name),
			urlencoding::encode(&git_ref),
			encode_path(path)
		);

		let response = self
			.send(installation, Method::GET, &src_path, |req| {
				req.query(&[("format", "meta")])
			})
			.await?;
		let meta: SourceMeta = http::json_body(response).await?;
		if meta.entry_type != "commit_file" {
			return Err(ScmError::validation(format!("'{path}' is a directory")));
		}

		let raw = self
			.send(installation, Method::GET, &src_path, |req| req)
			.await?
			.bytes()
			.await
			.map_err(http::from_transport)?;
		let content = String::from_utf8(raw.to_vec())
			.map_err(|_| ScmError::validation("file content is not valid UTF-8"))?;

		let name = meta.path.rsplit('/').next().unwrap_or(&meta.path).to_string();
		let html_url = self
			.config
			.site_url()
			.join(&format!("{full_name}/src/{git_ref}/{}", meta.path))
			.map(String::from)
			.unwrap_or_default();

		Ok(RemoteFile {
			name,
			path: meta.path,
			content,
			html_url,
		})
	}

	/// `POST /repositories/{workspace}/{slug}/pullrequests`
	#[instrument(skip(self, request), fields(installation = %installation, full_name = %request.full_name))]
	async fn create_pull_request(
		&self,
		installation: &InstallationId,
		request: &PullRequestRequest,
	) -> Result<PullRequestResult> {
		let payload = CreatePullRequest {
			title: &request.title,
			description: &request.body,
			source: BranchRef::new(&request.source_branch),
			destination: BranchRef::new(&request.target_branch),
		};
		let path = format!("{}/pullrequests", repo_path(&request.full_name));
		let response = self
			.send(installation, Method::POST, &path, |req| req.json(&payload))
			.await
			.map_err(classify_pull_request_error)?;

		let pr: PullRequest = http::json_body(response).await?;
		info!(id = pr.id, "Pull request created");
		Ok(PullRequestResult {
			url: pr.links.html.href,
			number: Some(pr.id),
		})
	}

	async fn invalidate_credentials(&self, installation: &InstallationId) {
		self.auth.invalidate(installation).await;
	}

	/// Bitbucket has no endpoint for revoking a consumer grant; the tenant
	/// removes the consumer from their account settings.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn disconnect(&self, installation: &InstallationId) -> Result<()> {
		warn!("Bitbucket grants cannot be revoked remotely; disconnecting locally");
		self.auth.revoke(installation).await;
		Ok(())
	}
}
