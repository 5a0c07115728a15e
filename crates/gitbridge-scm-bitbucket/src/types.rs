// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use gitbridge_scm_core::{OrganizationType, RemoteOrganization, RemoteRepository};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct User {
	pub username: Option<String>,
	pub nickname: Option<String>,
	pub account_id: Option<String>,
}

impl User {
	pub fn into_organization(self) -> Option<RemoteOrganization> {
		let name = self.username.or(self.nickname).or(self.account_id)?;
		Some(RemoteOrganization {
			name,
			org_type: OrganizationType::User,
		})
	}
}

/// Bitbucket's paginated envelope. `size` is omitted when counting would be
/// expensive.
#[derive(Debug, Deserialize)]
pub(crate) struct Paginated<T> {
	pub size: Option<u64>,
	pub next: Option<String>,
	#[serde(default = "Vec::new")]
	pub values: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
	pub slug: String,
	pub full_name: String,
	pub is_private: bool,
	pub mainbranch: Option<Branch>,
	pub links: Links,
}

impl Repository {
	pub fn into_remote(self, admin: bool) -> RemoteRepository {
		RemoteRepository {
			name: self.slug,
			full_name: self.full_name,
			url: self.links.html.href,
			default_branch: self
				.mainbranch
				.map(|b| b.name)
				.unwrap_or_else(|| "main".to_string()),
			private: self.is_private,
			admin,
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct Branch {
	pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Links {
	pub html: Link,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Link {
	pub href: String,
}

/// One entry of `GET /user/permissions/repositories`.
#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryPermission {
	/// `admin`, `write` or `read`
	pub permission: String,
	pub repository: PermissionRepository,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PermissionRepository {
	pub full_name: String,
}

/// `GET /src/{ref}/{path}?format=meta`
#[derive(Debug, Deserialize)]
pub(crate) struct SourceMeta {
	/// `commit_file` or `commit_directory`
	#[serde(rename = "type")]
	pub entry_type: String,
	pub path: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePullRequest<'a> {
	pub title: &'a str,
	pub description: &'a str,
	pub source: BranchRef<'a>,
	pub destination: BranchRef<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BranchRef<'a> {
	pub branch: BranchName<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BranchName<'a> {
	pub name: &'a str,
}

impl<'a> BranchRef<'a> {
	pub fn new(name: &'a str) -> Self {
		Self {
			branch: BranchName { name },
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
	pub id: u64,
	pub links: Links,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn repository_maps_slug_and_main_branch() {
		let repo: Repository = serde_json::from_value(json!({
			"type": "repository",
			"name": "Ofek",
			"slug": "ofek",
			"full_name": "tupe12334/ofek",
			"is_private": true,
			"mainbranch": {"type": "branch", "name": "develop"},
			"links": {"html": {"href": "https://bitbucket.org/tupe12334/ofek"}},
		}))
		.unwrap();
		let remote = repo.into_remote(true);
		assert_eq!(remote.name, "ofek");
		assert_eq!(remote.default_branch, "develop");
		assert!(remote.private);
		assert!(remote.admin);
	}

	#[test]
	fn empty_repository_has_no_main_branch() {
		let repo: Repository = serde_json::from_value(json!({
			"slug": "empty",
			"full_name": "tupe12334/empty",
			"is_private": false,
			"mainbranch": null,
			"links": {"html": {"href": "https://bitbucket.org/tupe12334/empty"}},
		}))
		.unwrap();
		assert_eq!(repo.into_remote(false).default_branch, "main");
	}

	#[test]
	fn pull_request_payload_nests_branch_names() {
		let payload = CreatePullRequest {
			title: "t",
			description: "d",
			source: BranchRef::new("feature"),
			destination: BranchRef::new("main"),
		};
		assert_eq!(
			serde_json::to_value(&payload).unwrap(),
			json!({
				"title": "t",
				"description": "d",
				"source": {"branch": {"name": "feature"}},
				"destination": {"branch": {"name": "main"}},
			})
		);
	}
}
