// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Canonical values returned by every provider adapter.
//!
//! All of these are snapshots: nothing here refers back to the adapter or the
//! backend, so callers may keep or drop them freely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ScmError;

/// The closed set of supported hosting backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
	GitHub,
	GitLab,
	Bitbucket,
}

impl ProviderKind {
	pub const ALL: [ProviderKind; 3] = [
		ProviderKind::GitHub,
		ProviderKind::GitLab,
		ProviderKind::Bitbucket,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			ProviderKind::GitHub => "github",
			ProviderKind::GitLab => "gitlab",
			ProviderKind::Bitbucket => "bitbucket",
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProviderKind {
	type Err = ScmError;

	/// Selectors come from tenant-influenced configuration, so anything
	/// unrecognised is a typed `UnsupportedProvider`.
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"github" => Ok(ProviderKind::GitHub),
			"gitlab" => Ok(ProviderKind::GitLab),
			"bitbucket" => Ok(ProviderKind::Bitbucket),
			_ => Err(ScmError::unsupported_provider(s)),
		}
	}
}

/// Opaque identity of a tenant's grant with one backend.
///
/// GitHub uses numeric installation ids; GitLab and Bitbucket installations
/// are keyed by whatever id the host application assigned when the tenant
/// connected. Configuration may spell it as a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstallationId(String);

impl InstallationId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Interpret the id as a backend numeric id.
	pub fn as_numeric(&self) -> Result<i64, ScmError> {
		self
			.0
			.parse()
			.map_err(|_| ScmError::validation(format!("installation id '{}' is not numeric", self.0)))
	}
}

impl fmt::Display for InstallationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for InstallationId {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}

impl From<String> for InstallationId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

impl From<i64> for InstallationId {
	fn from(value: i64) -> Self {
		Self(value.to_string())
	}
}

impl<'de> Deserialize<'de> for InstallationId {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			Text(String),
			Number(i64),
		}

		Ok(match Raw::deserialize(deserializer)? {
			Raw::Text(s) => InstallationId(s),
			Raw::Number(n) => InstallationId(n.to_string()),
		})
	}
}

/// A repository reference in `owner/name` form.
///
/// The owner may itself contain slashes (GitLab subgroups); the name is the
/// final segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullName {
	owner: String,
	name: String,
}

impl FullName {
	pub fn parse(raw: &str) -> Result<Self, ScmError> {
		let trimmed = raw.trim().trim_matches('/');
		let (owner, name) = trimmed
			.rsplit_once('/')
			.ok_or_else(|| ScmError::validation(format!("'{raw}' is not in owner/name form")))?;

		let valid_segment = |s: &str| !s.is_empty() && s != "." && s != "..";
		if !owner.split('/').all(valid_segment) || !valid_segment(name) {
			return Err(ScmError::validation(format!(
				"'{raw}' is not in owner/name form"
			)));
		}

		Ok(Self {
			owner: owner.to_string(),
			name: name.to_string(),
		})
	}

	pub fn owner(&self) -> &str {
		&self.owner
	}

	pub fn name(&self) -> &str {
		&self.name
	}
}

impl fmt::Display for FullName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.owner, self.name)
	}
}

impl FromStr for FullName {
	type Err = ScmError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrganizationType {
	User,
	Organization,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrganization {
	pub name: String,
	#[serde(rename = "type")]
	pub org_type: OrganizationType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepository {
	pub name: String,
	pub full_name: String,
	pub url: String,
	pub default_branch: String,
	pub private: bool,
	/// Whether the calling installation administers the repository, as of
	/// this fetch.
	pub admin: bool,
}

/// One page of a repository listing.
///
/// Built through [`crate::PageRequest::assemble`], which enforces
/// `repos.len() <= page_size` and `current_page >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRepositoryPage {
	pub repos: Vec<RemoteRepository>,
	pub total_repos: u64,
	pub page_size: u32,
	pub current_page: u32,
}

/// A file fetched from a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
	pub name: String,
	/// Repository-relative path.
	pub path: String,
	/// Decoded file body.
	pub content: String,
	pub html_url: String,
}

/// Arguments for opening a pull (merge) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
	pub full_name: FullName,
	pub source_branch: String,
	pub target_branch: String,
	pub title: String,
	pub body: String,
}

impl PullRequestRequest {
	/// Validate the branch pair and title before anything reaches a backend.
	pub fn new(
		full_name: FullName,
		source_branch: impl Into<String>,
		target_branch: impl Into<String>,
		title: impl Into<String>,
		body: impl Into<String>,
	) -> Result<Self, ScmError> {
		let source_branch = source_branch.into().trim().to_string();
		let target_branch = target_branch.into().trim().to_string();
		let title = title.into();

		if source_branch.is_empty() || target_branch.is_empty() {
			return Err(ScmError::validation(
				"source and target branches are required",
			));
		}
		if source_branch == target_branch {
			return Err(ScmError::validation(format!(
				"source and target branch are both '{source_branch}'"
			)));
		}
		if title.trim().is_empty() {
			return Err(ScmError::validation("pull request title is required"));
		}

		Ok(Self {
			full_name,
			source_branch,
			target_branch,
			title,
			body: body.into(),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestResult {
	pub url: String,
	/// Backend-assigned number (GitHub number, GitLab iid, Bitbucket id).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub number: Option<u64>,
}
