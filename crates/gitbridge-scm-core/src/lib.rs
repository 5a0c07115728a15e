// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Provider-agnostic contract for source-control hosting backends.
//!
//! Callers talk to GitHub, GitLab and Bitbucket through the [`GitProvider`]
//! trait and receive the canonical values defined in [`types`], or a typed
//! [`ScmError`] they can branch on.

pub mod error;
pub mod http;
pub mod lease;
pub mod pagination;
pub mod provider;
pub mod types;

pub use error::{ErrorKind, Result, ScmError};
pub use lease::CredentialLease;
pub use pagination::{PageRequest, MAX_PAGE_SIZE};
pub use provider::GitProvider;
pub use types::{
	FullName, InstallationId, OrganizationType, ProviderKind, PullRequestRequest,
	PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository, RemoteRepositoryPage,
};
