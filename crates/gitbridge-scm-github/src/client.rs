// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App implementation of [`GitProvider`].

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use gitbridge_common_config::ConfigError;
use gitbridge_scm_auth::AuthManager;
use gitbridge_scm_core::{
	http, FullName, GitProvider, InstallationId, PageRequest, ProviderKind, PullRequestRequest,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
	Result, ScmError,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument};

use crate::auth::{AppAuthenticator, ACCEPT_JSON};
use crate::config::GithubConfig;
use crate::types::{
	ContentsResponse, CreatePullRequest, InstallationRepositories, InstallationResponse,
	PullRequestResponse, RepoResponse,
};

const ACCEPT_RAW: &str = "application/vnd.github.raw";

/// Adapter for GitHub (and GitHub Enterprise Server) via a GitHub App.
///
/// Installation tokens are cached per installation in an [`AuthManager`];
/// app-level calls use a cached app JWT.
pub struct GithubProvider {
	app: Arc<AppAuthenticator>,
	auth: Arc<AuthManager>,
}

impl GithubProvider {
	pub fn new(config: GithubConfig) -> std::result::Result<Self, ConfigError> {
		let http_client = gitbridge_common_http::new_client_with_timeout(config.request_timeout())
			.map_err(|e| ConfigError::invalid("github.http_client", e.to_string()))?;

		info!(
			app_id = config.app_id(),
			base_url = %config.base_url(),
			"Created GitHub provider"
		);

		let refresh_margin = config.refresh_margin();
		let app = Arc::new(AppAuthenticator::new(http_client, config));
		let auth = Arc::new(AuthManager::new(app.clone()).with_refresh_margin(refresh_margin));
		Ok(Self { app, auth })
	}

	/// The lease store backing this adapter.
	pub fn auth_manager(&self) -> &Arc<AuthManager> {
		&self.auth
	}

	/// Send an installation-authenticated JSON request built by `build`.
	async fn send(
		&self,
		installation: &InstallationId,
		method: Method,
		path: &str,
		build: impl FnOnce(RequestBuilder) -> RequestBuilder,
	) -> Result<Response> {
		self
			.send_accepting(installation, method, path, ACCEPT_JSON, build)
			.await
	}

	async fn send_accepting(
		&self,
		installation: &InstallationId,
		method: Method,
		path: &str,
		accept: &str,
		build: impl FnOnce(RequestBuilder) -> RequestBuilder,
	) -> Result<Response> {
		let lease = self.auth.acquire(installation).await?;
		let url = self.app.url(path)?;
		debug!(url = %url, %method, "Sending installation request");

		let response = build(self.app.request(method, url, lease.token(), accept))
			.send()
			.await
			.map_err(http::from_transport)?;
		http::check(response).await
	}
}

/// Percent-encode each segment of a slash-separated path.
fn encode_path(path: &str) -> String {
	path
		.split('/')
		.filter(|s| !s.is_empty())
		.map(|s| urlencoding::encode(s).into_owned())
		.collect::<Vec<_>>()
		.join("/")
}

fn repo_path(full_name: &FullName) -> String {
	format!(
		"repos/{}/{}",
		urlencoding::encode(full_name.owner()),
		urlencoding::encode(full_name.name())
	)
}

fn decode_content(encoding: Option<&str>, content: &str) -> Result<String> {
	let bytes = match encoding {
		Some("base64") | None => {
			let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
			base64::engine::general_purpose::STANDARD
				.decode(compact)
				.map_err(http::malformed)?
		}
		Some("utf-8") | Some("utf8") => content.as_bytes().to_vec(),
		Some(other) => return Err(http::malformed(format!("unknown content encoding '{other}'"))),
	};
	String::from_utf8(bytes).map_err(|_| ScmError::validation("file content is not valid UTF-8"))
}

#[async_trait]
impl GitProvider for GithubProvider {
	fn kind(&self) -> ProviderKind {
		ProviderKind::GitHub
	}

	fn installation_url(&self, state: &str) -> String {
		self.app.config().installation_url(state)
	}

	/// `GET /app/installations/{id}` (app JWT)
	#[instrument(skip(self), fields(installation = %installation))]
	async fn get_organization(&self, installation: &InstallationId) -> Result<RemoteOrganization> {
		let installation_id = installation.as_numeric()?;
		let response = self
			.app
			.send_as_app(Method::GET, &format!("app/installations/{installation_id}"))
			.await?;

		let body: InstallationResponse = http::json_body(response).await?;
		body
			.account
			.and_then(|account| account.into_organization())
			.ok_or_else(|| ScmError::not_found(format!("installation {installation} has no account")))
	}

	/// `GET /installation/repositories`
	#[instrument(skip(self), fields(installation = %installation, page = page.page(), page_size = page.page_size()))]
	async fn list_repositories(
		&self,
		installation: &InstallationId,
		page: PageRequest,
	) -> Result<RemoteRepositoryPage> {
		let (per_page, page_no) = (page.page_size().to_string(), page.page().to_string());
		let response = self
			.send(installation, Method::GET, "installation/repositories", |req| {
				req.query(&[("per_page", per_page.as_str()), ("page", page_no.as_str())])
			})
			.await?;

		let body: InstallationRepositories = http::json_body(response).await?;
		debug!(
			total_count = body.total_count,
			count = body.repositories.len(),
			"Repositories listed"
		);

		let repos = body.repositories.into_iter().map(RemoteRepository::from).collect();
		Ok(page.assemble(repos, body.total_count))
	}

	/// `GET /repos/{owner}/{repo}`
	#[instrument(skip(self), fields(installation = %installation, full_name = %full_name))]
	async fn get_repository(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
	) -> Result<RemoteRepository> {
		let response = self
			.send(installation, Method::GET, &repo_path(full_name), |req| req)
			.await?;
		let repo: RepoResponse = http::json_body(response).await?;
		Ok(repo.into())
	}

	/// `GET /repos/{owner}/{repo}/contents/{path}`; files beyond the contents
	/// API size limit are fetched again as raw media.
	#[instrument(skip(self), fields(installation = %installation, full_name = %full_name))]
	async fn get_file(
		&self,
		installation: &InstallationId,
		full_name: &FullName,
		path: &str,
		git_ref: Option<&str>,
	) -> Result<RemoteFile> {
		let api_path = format!("{}/contents/{}", repo_path(full_name), encode_path(path));
		let with_ref = |req: RequestBuilder| match git_ref {
			Some(r) => req.query(&[("ref", r)]),
			None => req,
		};

		let response = self
			.send(installation, Method::GET, &api_path, with_ref)
			.await?;

		let file = match http::json_body::<ContentsResponse>(response).await? {
			ContentsResponse::File(file) if file.content_type == "file" => file,
			ContentsResponse::File(other) => {
				return Err(ScmError::validation(format!(
					"'{path}' is a {}, not a file",
					other.content_type
				)))
			}
			ContentsResponse::Directory(_) => {
				return Err(ScmError::validation(format!("'{path}' is a directory")))
			}
		};

		let content = match (file.encoding.as_deref(), file.content.as_deref()) {
			(Some("none"), _) | (_, None) => {
				debug!("Contents API omitted the body; fetching raw");
				let raw = self
					.send_accepting(installation, Method::GET, &api_path, ACCEPT_RAW, with_ref)
					.await?
					.bytes()
					.await
					.map_err(http::from_transport)?;
				String::from_utf8(raw.to_vec())
					.map_err(|_| ScmError::validation("file content is not valid UTF-8"))?
			}
			(encoding, Some(content)) => decode_content(encoding, content)?,
		};

		Ok(RemoteFile {
			name: file.name,
			path: file.path,
			content,
			html_url: file.html_url.unwrap_or_default(),
		})
	}

	/// `POST /repos/{owner}/{repo}/pulls`
	#[instrument(skip(self, request), fields(installation = %installation, full_name = %request.full_name))]
	async fn create_pull_request(
		&self,
		installation: &InstallationId,
		request: &PullRequestRequest,
	) -> Result<PullRequestResult> {
		let payload = CreatePullRequest {
			title: &request.title,
			body: &request.body,
			head: &request.source_branch,
			base: &request.target_branch,
		};

		let path = format!("{}/pulls", repo_path(&request.full_name));
		let response = match self
			.send(installation, Method::POST, &path, |req| req.json(&payload))
			.await
		{
			Ok(response) => response,
			Err(err) => return Err(classify_pull_request_error(err)),
		};

		let pr: PullRequestResponse = http::json_body(response).await?;
		info!(number = pr.number, "Pull request created");
		Ok(PullRequestResult {
			url: pr.html_url,
			number: Some(pr.number),
		})
	}

	async fn invalidate_credentials(&self, installation: &InstallationId) {
		self.auth.invalidate(installation).await;
	}

	/// `DELETE /app/installations/{id}` (app JWT). An installation GitHub no
	/// longer knows about counts as already disconnected.
	#[instrument(skip(self), fields(installation = %installation))]
	async fn disconnect(&self, installation: &InstallationId) -> Result<()> {
		let installation_id = installation.as_numeric()?;
		match self
			.app
			.send_as_app(Method::DELETE, &format!("app/installations/{installation_id}"))
			.await
		{
			Ok(_) => info!("Installation deleted"),
			Err(ScmError::NotFound { .. }) => info!("Installation already gone"),
			Err(err) => return Err(err),
		}
		self.auth.revoke(installation).await;
		Ok(())
	}
}

/// GitHub reports a duplicate pull request as a 422 validation failure.
fn classify_pull_request_error(err: ScmError) -> ScmError {
	match err {
		ScmError::Validation {
			status: Some(422),
			message,
		} if message.contains("A pull request already exists") => {
			ScmError::conflict(message).with_status(StatusCode::UNPROCESSABLE_ENTITY.as_u16())
		}
		other => other,
	}
}
