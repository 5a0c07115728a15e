// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! GitHub App adapter.
//!
//! Authenticates as a GitHub App: an RS256 JWT signed with the app's private
//! key is exchanged for short-lived installation tokens, which are cached and
//! renewed by [`gitbridge_scm_auth::AuthManager`].

mod auth;
mod client;
mod config;
mod jwt;
mod types;

pub use auth::AppAuthenticator;
pub use client::GithubProvider;
pub use config::GithubConfig;
pub use jwt::{generate_app_jwt, JWT_VALIDITY};
