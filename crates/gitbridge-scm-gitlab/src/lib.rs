// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitLab adapter (gitlab.com and self-managed, REST v4).
//!
//! An installation is one user's OAuth grant, or a static access token for
//! service accounts. Projects the user is a member of stand in for the
//! repositories of the installation; `admin` means Maintainer or above.

mod client;
mod config;
mod types;

pub use client::GitlabProvider;
pub use config::GitlabConfig;
