// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Credential lease management for hosting-provider installations.
//!
//! [`AuthManager`] owns every [`CredentialLease`] in the process. Each
//! installation moves through
//! `Unauthenticated -> Authenticating -> Active -> Expiring -> Authenticating`
//! until it is explicitly revoked or the backend rejects a token exchange,
//! after which it stays `Revoked`.
//!
//! Renewal is serialized per installation: concurrent [`AuthManager::acquire`]
//! calls for the same installation wait on the one in-flight exchange, while
//! unrelated installations renew in parallel.
//!
//! [`oauth`] supplies the exchanger for backends connected through an OAuth
//! consumer.

mod manager;
pub mod oauth;

pub use manager::{AuthManager, LeaseState, TokenExchanger, DEFAULT_REFRESH_MARGIN};
pub use oauth::{
	ClientAuth, GrantStore, InMemoryGrantStore, OAuthClient, OAuthGrant, OAuthRefreshExchanger,
};
