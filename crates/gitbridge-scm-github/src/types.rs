// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub REST response shapes and their canonical mappings.

use chrono::{DateTime, Utc};
use gitbridge_scm_core::{OrganizationType, RemoteOrganization, RemoteRepository};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct AccessTokenResponse {
	pub token: String,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstallationResponse {
	pub account: Option<Account>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Account {
	/// Users and organizations carry `login`; enterprise accounts carry `slug`.
	pub login: Option<String>,
	pub slug: Option<String>,
	#[serde(rename = "type")]
	pub account_type: Option<String>,
}

impl Account {
	pub fn into_organization(self) -> Option<RemoteOrganization> {
		let org_type = match self.account_type.as_deref() {
			Some("User") => OrganizationType::User,
			_ => OrganizationType::Organization,
		};
		let name = self.login.or(self.slug)?;
		Some(RemoteOrganization { name, org_type })
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstallationRepositories {
	pub total_count: u64,
	pub repositories: Vec<RepoResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoResponse {
	pub name: String,
	pub full_name: String,
	pub html_url: String,
	pub default_branch: Option<String>,
	pub private: bool,
	pub permissions: Option<Permissions>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Permissions {
	#[serde(default)]
	pub admin: bool,
}

impl From<RepoResponse> for RemoteRepository {
	fn from(repo: RepoResponse) -> Self {
		RemoteRepository {
			name: repo.name,
			full_name: repo.full_name,
			url: repo.html_url,
			// Empty repositories have no default branch yet
			default_branch: repo.default_branch.unwrap_or_else(|| "main".to_string()),
			private: repo.private,
			admin: repo.permissions.unwrap_or_default().admin,
		}
	}
}

/// `GET /repos/{owner}/{repo}/contents/{path}` answers with an object for a
/// file and an array for a directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContentsResponse {
	File(ContentFile),
	Directory(Vec<serde_json::Value>),
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentFile {
	#[serde(rename = "type")]
	pub content_type: String,
	pub name: String,
	pub path: String,
	pub html_url: Option<String>,
	pub encoding: Option<String>,
	pub content: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullRequest<'a> {
	pub title: &'a str,
	pub body: &'a str,
	pub head: &'a str,
	pub base: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequestResponse {
	pub html_url: String,
	pub number: u64,
}
