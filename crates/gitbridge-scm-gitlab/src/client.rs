// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitLab implementation of [`GitProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use gitbridge_common_config::{ConfigError, SecretString};
use gitbridge_scm_auth::{AuthManager, GrantStore, OAuthClient, OAuthGrant, OAuthRefreshExchanger};
use gitbridge_scm_core::{
	http, FullName, GitProvider, InstallationId, PageRequest, ProviderKind, PullRequestRequest,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
	Result, ScmError, MAX_PAGE_SIZE,
};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use tracing::{debug, info, instrument, warn};

use crate::config::GitlabConfig;
use crate::types::{CreateMergeRequest, MergeRequest, Project, RepositoryFile, User};

/// Adapter for gitlab.com and self-managed GitLab.
///
/// Installations are OAuth grants (or static access tokens) held in a
/// [`GrantStore`]; access tokens are leased through an [`AuthManager`].
pub struct GitlabProvider {
	http_client: Client,
	config: GitlabConfig,
	oauth: OAuthClient,
	grants: Arc<dyn GrantStore>,
	auth: Arc<AuthManager>,
}

impl GitlabProvider {
	pub fn new(
		config: GitlabConfig,
		grants: Arc<dyn GrantStore>,
	) -> std::result::Result<Self, ConfigError> {
		config.validate()?;
		let http_client = gitbridge_common_http::new_client_with_timeout(config.request_timeout())
			.map_err(|e| ConfigError::invalid("gitlab.http_client", e.to_string()))?;
		let oauth = config.oauth_client()?;

		let exchanger = OAuthRefreshExchanger::new(http_client.clone(), oauth.clone(), grants.clone());
		let auth = Arc::new(
			AuthManager::new(Arc::new(exchanger)).with_refresh_margin(config.refresh_margin()),
		);

		info!(base_url = %config.base_url(), "Created GitLab provider");
		Ok(Self {
			http_client,
			config,
			oauth,
			grants,
			auth,
		})
	}

	pub fn auth_manager(&self) -> &Arc<AuthManager> {
		&self.auth
	}

	fn url(&self, path: &str) -> Result<Url> {
		self
			.config
			.base_url()
			.join(path)
			.map_err(|e| ScmError::validation(format!("invalid GitLab URL for '{path}': {e}")))
	}

	async fn send(
		&self,
		installation: &InstallationId,
		method: Method,
		path: &str,
		build: impl FnOnce(RequestBuilder) -> RequestBuilder,
	) -> Result<Response> {
		let lease = self.auth.acquire(installation).await?;
		let url = self.url(path)?;
		debug!(url = %url, %method, "Sending GitLab request");

		let request = self
			.http_client
			.request(method, url)
			.bearer_auth(lease.token().expose())
			.header(ACCEPT, "application/json");
		let response = build(request).send().await.map_err(http::from_transport)?;
		http::check(response).await
	}

	async fn fetch_project(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<Project> {
		let response = self
			.send(installation, Method::GET, &project_path(full_name), |req| req)
			.await?;
		http::json_body(response).await
	}

	/// Count member projects by walking the listing at the largest page size.
	/// GitLab drops `X-Total` when the count is too expensive to compute.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn count_projects(&self, installation: &InstallationId) -> Result<u64> {
		let per_page = MAX_PAGE_SIZE.to_string();
		let mut total = 0u64;
		let mut page = 1u32;
		loop {
			let page_no = page.to_string();
			let response = self
				.send(installation, Method::GET, "projects", |req| {
					req.query(&project_query(&per_page, &page_no))
				})
				.await?;
			let next = next_page(&response);
			let projects: Vec<serde_json::Value> = http::json_body(response).await?;
			total += projects.len() as u64;

			match next {
				Some(n) if n > page && projects.len() as u32 == MAX_PAGE_SIZE => page = n,
				_ => break,
			}
		}
		debug!(total, "Counted projects by walking the listing");
		Ok(total)
	}
}

/// `projects/{url-encoded full path}`; nested groups are part of the id.
fn project_path(full_name: &FullName) -> String {
	format!("projects/{}", urlencoding::encode(&full_name.to_string()))
}

fn project_query<'a>(per_page: &'a str, page: &'a str) -> [(&'static str, &'a str); 6] {
	[
		("membership", "true"),
		("order_by", "id"),
		("sort", "asc"),
		("simple", "false"),
		("per_page", per_page),
		("page", page),
	]
}

fn next_page(response: &Response) -> Option<u32> {
	response
		.headers()
		.get("x-next-page")
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.trim().parse().ok())
}

fn decode_content(file: &RepositoryFile) -> Result<String> {
	let bytes = match file.encoding.as_deref() {
		Some("base64") | None => base64::engine::general_purpose::STANDARD
			.decode(file.content.trim())
			.map_err(http::malformed)?,
		Some("text") => file.content.as_bytes().to_vec(),
		Some(other) => return Err(http::malformed(format!("unknown content encoding '{other}'"))),
	};
	String::from_utf8(bytes).map_err(|_| ScmError::validation("file content is not valid UTF-8"))
}

#[async_trait]
impl GitProvider for GitlabProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::GitLab
	}

	fn installation_url(&self, state: &str) -> String {
		self.oauth.authorization_url(state)
	}

	/// `GET /user`. A GitLab installation acts for the user who granted it.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn get_organization(&self, installation: &InstallationId) -> Result<RemoteOrganization> {
		let response = self.send(installation, Method::GET, "user", |req| req).await?;
		let user: User = http::json_body(response).await?;
		Ok(user.into())
	}

	/// `GET /projects?membership=true`
	#[instrument(skip(self), fields(installation = %installation, page = page.page(), page_size = page.page_size()))]
	async fn list_repositories(
		&self,
		installation: &InstallationId,
		page: PageRequest,
	) -> Result<RemoteRepositoryPage> {
		let (per_page, page_no) = (page.page_size().to_string(), page.page().to_string());
		let response = self
			.send(installation, Method::GET, "projects", |req| {
				req.query(&project_query(&per_page, &page_no))
			})
			.await?;

		let reported_total = http::header_u64(response.headers(), "x-total");
		let projects: Vec<Project> = http::json_body(response).await?;
		let repos: Vec<RemoteRepository> = projects.into_iter().map(RemoteRepository::from).collect();

		let total = match reported_total {
			Some(total) => total,
			None => self.count_projects(installation).await?,
		};
		debug!(total, count = repos.len(), "Projects listed");
		Ok(page.assemble(repos, total))
	}

	/// `GET /projects/{id}`
	#[instrument(skip(self), fields(installation = %installation, full_name = %full_name))]
	async fn get_repository(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<RemoteRepository> {
		Ok(self.fetch_project(installation, full_name).await?.into())
	}

	/// `GET /projects/{id}/repository/files/{path}?ref=`
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
			None => {
				let project = self.fetch_project(installation, full_name).await?;
				project.default_branch.ok_or_else(|| {
					ScmError::not_found(format!("{full_name} has no default branch"))
				})?
			}
		};

		let file_path = path.trim_matches('/');
		let api_path = format!(
			"{}/repository/files/{}",
			project_path(full_name),
			urlencoding::encode(file_path)
		);
		let response = self
			.send(installation, Method::GET, &api_path, |req| {
				req.query(&[("ref", git_ref.as_str())])
			})
			.await?;
		let file: RepositoryFile = http::json_body(response).await?;
		let content = decode_content(&file)?;

		let html_url = self
			.config
			.web_url()
			.join(&format!("{full_name}/-/blob/{git_ref}/{}", file.file_path))
			.map(String::from)
			.unwrap_or_default();

		Ok(RemoteFile {
			name: file.file_name,
			path: file.file_path,
			content,
			html_url,
		})
	}

	/// `POST /projects/{id}/merge_requests`. GitLab answers 409 when an open
	/// merge request already exists for the source branch.
	#[instrument(skip(self, request), fields(installation = %installation, full_name = %request.full_name))]
	async fn create_pull_request(
		&self,
		installation: &InstallationId,
		request: &PullRequestRequest,
	) -> Result<PullRequestResult> {
		let payload = CreateMergeRequest {
			source_branch: &request.source_branch,
			target_branch: &request.target_branch,
			title: &request.title,
			description: &request.body,
		};
		let path = format!("{}/merge_requests", project_path(&request.full_name));
		let response = self
			.send(installation, Method::POST, &path, |req| req.json(&payload))
			.await?;

		let mr: MergeRequest = http::json_body(response).await?;
		info!(iid = mr.iid, "Merge request created");
		Ok(PullRequestResult {
			url: mr.web_url,
			number: Some(mr.iid),
		})
	}

	async fn invalidate_credentials(&self, installation: &InstallationId) {
		self.auth.invalidate(installation).await;
	}

	/// Revoke the refresh token at `POST /oauth/revoke`. Static access tokens
	/// are only forgotten locally.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn disconnect(&self, installation: &InstallationId) -> Result<()> {
		if let Some(OAuthGrant::RefreshToken(token)) = self.grants.load(installation).await {
			self.revoke_token(&token).await?;
			info!("Refresh token revoked");
		} else {
			warn!("No refresh token to revoke; disconnecting locally");
		}
		self.auth.revoke(installation).await;
		Ok(())
	}
}

impl GitlabProvider {
	async fn revoke_token(&self, token: &SecretString) -> Result<()> {
		let url = self
			.config
			.web_url()
			.join("oauth/revoke")
			.map_err(|e| ScmError::validation(e.to_string()))?;
		let response = self
			.http_client
			.post(url)
			.form(&[
				("client_id", self.config.client_id()),
				("client_secret", self.config.client_secret().expose().as_str()),
				("token", token.expose().as_str()),
				("token_type_hint", "refresh_token"),
			])
			.send()
			.await
			.map_err(http::from_transport)?;
		http::check(response).await?;
		Ok(())
	}
}
