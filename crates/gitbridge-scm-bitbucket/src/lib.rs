// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bitbucket Cloud adapter (REST 2.0).
//!
//! Installations are OAuth consumer grants refreshed through
//! [`gitbridge_scm_auth::OAuthRefreshExchanger`]. Repository listings carry
//! no permission data, so `admin` comes from a second lookup against
//! `/user/permissions/repositories` for the repositories on the page.

mod client;
mod config;
mod types;

pub use client::BitbucketProvider;
pub use config::BitbucketConfig;
