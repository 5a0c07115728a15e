// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitLab REST v4 response shapes and their canonical mappings.

use gitbridge_scm_core::{OrganizationType, RemoteOrganization, RemoteRepository};
use serde::{Deserialize, Serialize};

/// Maintainer. The lowest role allowed to change project settings.
pub(crate) const ADMIN_ACCESS_LEVEL: u32 = 40;

#[derive(Debug, Deserialize)]
pub(crate) struct User {
	pub username: String,
}

impl From<User> for RemoteOrganization {
	fn from(user: User) -> Self {
		RemoteOrganization {
			name: user.username,
			org_type: OrganizationType::User,
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct Project {
	pub path: String,
	pub path_with_namespace: String,
	pub web_url: String,
	pub default_branch: Option<String>,
	/// `private`, `internal` or `public`
	pub visibility: Option<String>,
	pub permissions: Option<Permissions>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Permissions {
	pub project_access: Option<Access>,
	pub group_access: Option<Access>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Access {
	pub access_level: u32,
}

impl Permissions {
	fn access_level(&self) -> u32 {
		[&self.project_access, &self.group_access]
			.into_iter()
			.flatten()
			.map(|a| a.access_level)
			.max()
			.unwrap_or(0)
	}
}

impl From<Project> for RemoteRepository {
	fn from(project: Project) -> Self {
		let access_level = project.permissions.unwrap_or_default().access_level();
		RemoteRepository {
			name: project.path,
			full_name: project.path_with_namespace,
			url: project.web_url,
			default_branch: project.default_branch.unwrap_or_else(|| "main".to_string()),
			// Internal projects are visible to every signed-in user but not
			// to the public
			private: project.visibility.as_deref() != Some("public"),
			admin: access_level >= ADMIN_ACCESS_LEVEL,
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepositoryFile {
	pub file_name: String,
	pub file_path: String,
	pub encoding: Option<String>,
	pub content: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateMergeRequest<'a> {
	pub source_branch: &'a str,
	pub target_branch: &'a str,
	pub title: &'a str,
	pub description: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequest {
	pub iid: u64,
	pub web_url: String,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn project(permissions: serde_json::Value, visibility: &str) -> RemoteRepository {
		let project: Project = serde_json::from_value(json!({
			"id": 7,
			"path": "ofek",
			"path_with_namespace": "tupe12334/ofek",
			"web_url": "https://gitlab.com/tupe12334/ofek",
			"default_branch": "master",
			"visibility": visibility,
			"permissions": permissions,
		}))
		.unwrap();
		project.into()
	}

	#[test]
	fn maintainer_through_group_is_admin() {
		let repo = project(
			json!({"project_access": {"access_level": 30}, "group_access": {"access_level": 40}}),
			"private",
		);
		assert!(repo.admin);
		assert!(repo.private);
		assert_eq!(repo.name, "ofek");
		assert_eq!(repo.full_name, "tupe12334/ofek");
		assert_eq!(repo.default_branch, "master");
	}

	#[test]
	fn developer_is_not_admin() {
		let repo = project(
			json!({"project_access": {"access_level": 30}, "group_access": null}),
			"public",
		);
		assert!(!repo.admin);
		assert!(!repo.private);
	}

	#[test]
	fn internal_projects_are_private() {
		assert!(project(json!(null), "internal").private);
	}
}
