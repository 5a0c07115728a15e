// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! OAuth 2.0 grants for installations connected through an OAuth consumer
//! (GitLab applications, Bitbucket consumers).
//!
//! An installation holds either a long-lived access token, used as-is, or a
//! refresh token that [`OAuthRefreshExchanger`] trades for short-lived access
//! tokens. Providers that rotate refresh tokens hand back a new one on every
//! exchange; it is written back to the [`GrantStore`] before the lease is
//! returned.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitbridge_common_secret::SecretString;
use gitbridge_scm_core::{http, CredentialLease, InstallationId, Result, ScmError};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use url::Url;

use crate::TokenExchanger;

/// Credential material an installation was connected with.
#[derive(Debug, Clone)]
pub enum OAuthGrant {
	/// A token that does not expire (GitLab personal/project access token).
	AccessToken(SecretString),
	/// A refresh token exchanged for access tokens on demand.
	RefreshToken(SecretString),
}

/// Where installation grants live. The host application owns persistence;
/// this is the seam it plugs into.
#[async_trait]
pub trait GrantStore: Send + Sync {
	async fn load(&self, installation: &InstallationId) -> Option<OAuthGrant>;

	/// Record a rotated refresh token.
	async fn store_refresh_token(&self, installation: &InstallationId, refresh_token: SecretString);
}

/// Process-local [`GrantStore`], seeded from configuration.
#[derive(Debug, Default)]
pub struct InMemoryGrantStore {
	grants: RwLock<HashMap<InstallationId, OAuthGrant>>,
}

impl InMemoryGrantStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_grants(grants: impl IntoIterator<Item = (InstallationId, OAuthGrant)>) -> Self {
		Self {
			grants: RwLock::new(grants.into_iter().collect()),
		}
	}

	pub async fn insert(&self, installation: InstallationId, grant: OAuthGrant) {
		self.grants.write().await.insert(installation, grant);
	}
}

#[async_trait]
impl GrantStore for InMemoryGrantStore {
	async fn load(&self, installation: &InstallationId) -> Option<OAuthGrant> {
		self.grants.read().await.get(installation).cloned()
	}

	async fn store_refresh_token(&self, installation: &InstallationId, refresh_token: SecretString) {
		self.grants.write().await.insert(
			installation.clone(),
			OAuthGrant::RefreshToken(refresh_token),
		);
	}
}

/// How the token endpoint expects client credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientAuth {
	/// `client_id` and `client_secret` form fields (GitLab).
	RequestBody,
	/// HTTP basic auth (Bitbucket).
	Basic,
}

/// An OAuth consumer registered with a hosting backend.
#[derive(Clone)]
pub struct OAuthClient {
	client_id: String,
	client_secret: SecretString,
	authorize_url: Url,
	token_url: Url,
	redirect_uri: Option<String>,
	scopes: Vec<String>,
	client_auth: ClientAuth,
}

impl fmt::Debug for OAuthClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OAuthClient")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("authorize_url", &self.authorize_url.as_str())
			.field("token_url", &self.token_url.as_str())
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("client_auth", &self.client_auth)
			.finish()
	}
}

impl OAuthClient {
	pub fn new(
		client_id: impl Into<String>,
		client_secret: SecretString,
		authorize_url: Url,
		token_url: Url,
		client_auth: ClientAuth,
	) -> Self {
		Self {
			client_id: client_id.into(),
			client_secret,
			authorize_url,
			token_url,
			redirect_uri: None,
			scopes: Vec::new(),
			client_auth,
		}
	}

	/// The callback registered with the consumer. GitLab requires it on the
	/// refresh request as well as on authorization.
	pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
		self.redirect_uri = Some(redirect_uri.into());
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

	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// The consent page a tenant opens to connect an installation.
	#[instrument(skip(self), fields(client_id = %self.client_id))]
	pub fn authorization_url(&self, state: &str) -> String {
		let mut url = self.authorize_url.clone();
		{
			let mut query = url.query_pairs_mut();
			query
				.append_pair("client_id", &self.client_id)
				.append_pair("response_type", "code");
			if let Some(redirect_uri) = &self.redirect_uri {
				query.append_pair("redirect_uri", redirect_uri);
			}
			if !self.scopes.is_empty() {
				query.append_pair("scope", &self.scopes.join(" "));
			}
			if !state.is_empty() {
				query.append_pair("state", state);
			}
		}
		url.to_string()
	}
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	refresh_token: Option<String>,
	expires_in: Option<u64>,
}

/// [`TokenExchanger`] backed by the OAuth refresh-token grant.
pub struct OAuthRefreshExchanger {
	http_client: Client,
	client: OAuthClient,
	grants: Arc<dyn GrantStore>,
}

impl fmt::Debug for OAuthRefreshExchanger {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("OAuthRefreshExchanger")
			.field("client", &self.client)
			.finish_non_exhaustive()
	}
}

impl OAuthRefreshExchanger {
	pub fn new(http_client: Client, client: OAuthClient, grants: Arc<dyn GrantStore>) -> Self {
		Self {
			http_client,
			client,
			grants,
		}
	}

	pub fn client(&self) -> &OAuthClient {
		&self.client
	}

	#[instrument(skip(self, refresh_token), fields(installation = %installation))]
	async fn refresh(
		&self,
		installation: &InstallationId,
		refresh_token: &SecretString,
	) -> Result<CredentialLease> {
		debug!(token_url = %self.client.token_url, "Refreshing OAuth access token");

		let mut form = vec![
			("grant_type", "refresh_token"),
			("refresh_token", refresh_token.expose().as_str()),
		];
		if self.client.client_auth == ClientAuth::RequestBody {
			form.push(("client_id", self.client.client_id.as_str()));
			form.push(("client_secret", self.client.client_secret.expose().as_str()));
		}
		if let Some(redirect_uri) = &self.client.redirect_uri {
			form.push(("redirect_uri", redirect_uri.as_str()));
		}

		let mut request = self
			.http_client
			.post(self.client.token_url.clone())
			.header(ACCEPT, "application/json")
			.form(&form);
		if self.client.client_auth == ClientAuth::Basic {
			request = request.basic_auth(
				&self.client.client_id,
				Some(self.client.client_secret.expose()),
			);
		}

		let response = request.send().await.map_err(http::from_transport)?;
		let token: TokenResponse = http::json(response).await?;

		if let Some(rotated) = token.refresh_token {
			if rotated != *refresh_token.expose() {
				self
					.grants
					.store_refresh_token(installation, SecretString::new(rotated))
					.await;
				info!("Stored rotated refresh token");
			}
		}

		let access_token = SecretString::new(token.access_token);
		Ok(match token.expires_in {
			Some(secs) => CredentialLease::expiring_in(access_token, Duration::from_secs(secs)),
			None => CredentialLease::non_expiring(access_token),
		})
	}
}

#[async_trait]
impl TokenExchanger for OAuthRefreshExchanger {
	async fn exchange(&self, installation: &InstallationId) -> Result<CredentialLease> {
		match self.grants.load(installation).await {
			Some(OAuthGrant::AccessToken(token)) => Ok(CredentialLease::non_expiring(token)),
			Some(OAuthGrant::RefreshToken(refresh_token)) => {
				self.refresh(installation, &refresh_token).await
			}
			None => Err(ScmError::auth_expired(format!(
				"no OAuth grant recorded for installation {installation}"
			))),
		}
	}
}
