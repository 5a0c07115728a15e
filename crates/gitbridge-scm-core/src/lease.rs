// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use gitbridge_common_secret::SecretString;

/// Short-lived token material for one installation.
///
/// Leases live only in the auth manager's process-local store and are handed
/// out by clone. `expires_at` of `None` means the backend declared no expiry
/// (a static access token).
#[derive(Debug, Clone)]
pub struct CredentialLease {
	token: SecretString,
	expires_at: Option<Instant>,
}

impl CredentialLease {
	pub fn new(token: SecretString, expires_at: Option<Instant>) -> Self {
		Self { token, expires_at }
	}

	/// A lease valid for `valid_for` from now.
	pub fn expiring_in(token: SecretString, valid_for: Duration) -> Self {
		Self::new(token, Instant::now().checked_add(valid_for))
	}

	/// A lease whose expiry the backend reported as a wall-clock time.
	/// An expiry already in the past yields a lease that is never usable.
	pub fn expiring_at(token: SecretString, expires_at: DateTime<Utc>) -> Self {
		let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
		Self::expiring_in(token, remaining)
	}

	pub fn non_expiring(token: SecretString) -> Self {
		Self::new(token, None)
	}

	pub fn token(&self) -> &SecretString {
		&self.token
	}

	pub fn expires_at(&self) -> Option<Instant> {
		self.expires_at
	}

	/// Time left before the backend-declared expiry, if there is one.
	pub fn remaining(&self) -> Option<Duration> {
		self
			.expires_at
			.map(|at| at.saturating_duration_since(Instant::now()))
	}

	/// Whether the lease may still be handed out with at least `margin` of
	/// validity left.
	pub fn is_usable(&self, margin: Duration) -> bool {
		self.is_usable_at(Instant::now(), margin)
	}

	pub fn is_usable_at(&self, now: Instant, margin: Duration) -> bool {
		match self.expires_at {
			None => true,
			Some(at) => now.checked_add(margin).is_some_and(|deadline| deadline < at),
		}
	}
}
