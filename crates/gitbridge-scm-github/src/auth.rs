// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! App-level authentication: the signed app JWT and the installation-token
//! exchange built on it.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use gitbridge_common_config::SecretString;
use gitbridge_scm_auth::TokenExchanger;
use gitbridge_scm_core::{http, CredentialLease, InstallationId, Result, ScmError};
use reqwest::header::ACCEPT;
use reqwest::{Client, Method, RequestBuilder, Url};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::config::GithubConfig;
use crate::jwt::{generate_app_jwt, JWT_VALIDITY};
use crate::types::AccessTokenResponse;

pub(crate) const API_VERSION: &str = "2022-11-28";
pub(crate) const ACCEPT_JSON: &str = "application/vnd.github+json";

const JWT_REFRESH_MARGIN: Duration = Duration::from_secs(30);

struct CachedJwt {
	token: SecretString,
	expires_at: Instant,
}

impl CachedJwt {
	fn is_valid(&self, margin: Duration) -> bool {
		Instant::now() + margin < self.expires_at
	}
}

/// Signs app JWTs and exchanges them for installation tokens.
pub struct AppAuthenticator {
	http_client: Client,
	config: GithubConfig,
	/// Cached app JWT. Held across generation so concurrent callers sign once.
	app_jwt: Mutex<Option<CachedJwt>>,
}

impl AppAuthenticator {
	pub fn new(http_client: Client, config: GithubConfig) -> Self {
		Self {
			http_client,
			config,
			app_jwt: Mutex::new(None),
		}
	}

	pub(crate) fn config(&self) -> &GithubConfig {
		&self.config
	}

	pub(crate) fn url(&self, path: &str) -> Result<Url> {
		self
			.config
			.base_url()
			.join(path)
			.map_err(|e| ScmError::validation(format!("invalid GitHub URL for '{path}': {e}")))
	}

	/// A request with GitHub's standard headers, authenticated by `token`.
	pub(crate) fn request(
		&self,
		method: Method,
		url: Url,
		token: &SecretString,
		accept: &str,
	) -> RequestBuilder {
		self
			.http_client
			.request(method, url)
			.bearer_auth(token.expose())
			.header(ACCEPT, accept)
			.header("X-GitHub-Api-Version", API_VERSION)
	}

	/// Get or generate the app JWT.
	#[instrument(skip(self))]
	pub(crate) async fn app_jwt(&self) -> Result<SecretString> {
		let mut cache = self.app_jwt.lock().await;
		if let Some(cached) = cache.as_ref() {
			if cached.is_valid(JWT_REFRESH_MARGIN) {
				trace!("Using cached App JWT");
				return Ok(cached.token.clone());
			}
		}

		debug!(app_id = self.config.app_id(), "Generating new App JWT");
		let token = SecretString::new(generate_app_jwt(
			self.config.app_id(),
			self.config.private_key_pem(),
		)?);
		*cache = Some(CachedJwt {
			token: token.clone(),
			expires_at: Instant::now() + JWT_VALIDITY,
		});
		Ok(token)
	}

	pub(crate) async fn invalidate_app_jwt(&self) {
		if self.app_jwt.lock().await.take().is_some() {
			info!("Invalidated App JWT cache");
		}
	}

	/// Send an app-level (JWT-authenticated) request. A 401 drops the cached
	/// JWT so the next call signs a fresh one.
	pub(crate) async fn send_as_app(&self, method: Method, path: &str) -> Result<reqwest::Response> {
		let jwt = self.app_jwt().await?;
		let url = self.url(path)?;
		debug!(url = %url, %method, "Sending app request");

		let response = self
			.request(method, url, &jwt, ACCEPT_JSON)
			.send()
			.await
			.map_err(http::from_transport)?;

		match http::check(response).await {
			Err(err) if err.is_auth_expired() => {
				self.invalidate_app_jwt().await;
				Err(err)
			}
			other => other,
		}
	}
}

#[async_trait]
impl TokenExchanger for AppAuthenticator {
	/// `POST /app/installations/{id}/access_tokens`
	#[instrument(skip(self), fields(installation = %installation))]
	async fn exchange(&self, installation: &InstallationId) -> Result<CredentialLease> {
		let installation_id = installation.as_numeric()?;
		let response = self
			.send_as_app(
				Method::POST,
				&format!("app/installations/{installation_id}/access_tokens"),
			)
			.await?;

		let token: AccessTokenResponse = http::json_body(response).await?;
		debug!(expires_at = %token.expires_at, "Installation token issued");

		Ok(CredentialLease::expiring_at(
			SecretString::new(token.token),
			token.expires_at,
		))
	}
}
