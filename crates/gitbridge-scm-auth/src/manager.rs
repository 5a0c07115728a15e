// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use gitbridge_common_http::{RetryClass, RetryableError};
use gitbridge_scm_core::{CredentialLease, InstallationId, Result, ScmError};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

/// Renew leases this long before the backend-declared expiry.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(120);

/// Backend-specific token exchange (GitHub App JWT for an installation
/// token, OAuth refresh grant, ...).
#[async_trait]
pub trait TokenExchanger: Send + Sync {
	async fn exchange(&self, installation: &InstallationId) -> Result<CredentialLease>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
	Unauthenticated,
	Authenticating,
	Active,
	/// The lease is still valid but inside the refresh margin.
	Expiring,
	Revoked,
}

impl fmt::Display for LeaseState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			LeaseState::Unauthenticated => "unauthenticated",
			LeaseState::Authenticating => "authenticating",
			LeaseState::Active => "active",
			LeaseState::Expiring => "expiring",
			LeaseState::Revoked => "revoked",
		};
		f.write_str(s)
	}
}

struct Entry {
	state: LeaseState,
	lease: Option<CredentialLease>,
}

impl Default for Entry {
	fn default() -> Self {
		Self {
			state: LeaseState::Unauthenticated,
			lease: None,
		}
	}
}

/// Process-local store of credential leases, keyed by installation.
pub struct AuthManager {
	exchanger: Arc<dyn TokenExchanger>,
	refresh_margin: Duration,
	entries: std::sync::Mutex<HashMap<InstallationId, Entry>>,
	/// Serializes token exchange per installation.
	renewal_locks: Mutex<HashMap<InstallationId, Arc<Mutex<()>>>>,
}

impl fmt::Debug for AuthManager {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AuthManager")
			.field("refresh_margin", &self.refresh_margin)
			.finish_non_exhaustive()
	}
}

impl AuthManager {
	pub fn new(exchanger: Arc<dyn TokenExchanger>) -> Self {
		Self {
			exchanger,
			refresh_margin: DEFAULT_REFRESH_MARGIN,
			entries: std::sync::Mutex::new(HashMap::new()),
			renewal_locks: Mutex::new(HashMap::new()),
		}
	}

	/// Renew this long before expiry. Zero disables proactive renewal; leases
	/// are still never handed out past their expiry.
	pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
		self.refresh_margin = margin;
		self
	}

	pub fn refresh_margin(&self) -> Duration {
		self.refresh_margin
	}

	/// Entry map. Never held across an await.
	fn entries(&self) -> MutexGuard<'_, HashMap<InstallationId, Entry>> {
		self.entries.lock().unwrap_or_else(PoisonError::into_inner)
	}

	async fn renewal_lock(&self, installation: &InstallationId) -> Arc<Mutex<()>> {
		let mut locks = self.renewal_locks.lock().await;
		locks
			.entry(installation.clone())
			.or_insert_with(|| Arc::new(Mutex::new(())))
			.clone()
	}

	/// The usable lease, if any. Errors when the installation is revoked.
	async fn cached(&self, installation: &InstallationId) -> Result<Option<CredentialLease>> {
		let entries = self.entries();
		match entries.get(installation) {
			Some(entry) if entry.state == LeaseState::Revoked => Err(revoked(installation)),
			Some(Entry {
				lease: Some(lease), ..
			}) if lease.is_usable(self.refresh_margin) => Ok(Some(lease.clone())),
			_ => Ok(None),
		}
	}

	/// Return a valid lease for `installation`, exchanging for a new one when
	/// the current lease is missing or inside the refresh margin.
	///
	/// Dropping the returned future mid-exchange puts the installation back
	/// in the state it had before the exchange started.
	#[instrument(skip(self), fields(installation = %installation))]
	pub async fn acquire(&self, installation: &InstallationId) -> Result<CredentialLease> {
		// Fast path: no renewal lock
		if let Some(lease) = self.cached(installation).await? {
			trace!("Using cached lease");
			return Ok(lease);
		}

		let lock = self.renewal_lock(installation).await;
		let _guard = lock.lock().await;

		// Another caller may have renewed (or revoked) while we waited
		if let Some(lease) = self.cached(installation).await? {
			trace!("Using cached lease (post-lock)");
			return Ok(lease);
		}

		let previous = self.set_state(installation, LeaseState::Authenticating);
		let mut in_flight = ExchangeGuard {
			manager: self,
			installation,
			previous,
			armed: true,
		};
		debug!("Exchanging for a new lease");

		let outcome = self.exchanger.exchange(installation).await;
		in_flight.armed = false;

		match outcome {
			Ok(lease) => {
				let mut entries = self.entries();
				let entry = entries.entry(installation.clone()).or_default();
				if entry.state == LeaseState::Revoked {
					// Revoked while the exchange was in flight
					return Err(revoked(installation));
				}
				entry.state = LeaseState::Active;
				entry.lease = Some(lease.clone());
				info!(expires_in = ?lease.remaining(), "Lease renewed");
				Ok(lease)
			}
			Err(err) if is_rejection(&err) => {
				warn!(error = %err, status = ?err.status(), "Backend rejected token exchange; revoking");
				let mut entries = self.entries();
				let entry = entries.entry(installation.clone()).or_default();
				entry.state = LeaseState::Revoked;
				entry.lease = None;
				Err(into_auth_expired(err))
			}
			Err(err) => {
				let mut entries = self.entries();
				let entry = entries.entry(installation.clone()).or_default();

				if let Some(lease) = entry
					.lease
					.as_ref()
					.filter(|l| l.is_usable(Duration::ZERO))
				{
					warn!(error = %err, "Lease renewal failed; using existing lease until expiry");
					entry.state = LeaseState::Expiring;
					return Ok(lease.clone());
				}

				warn!(error = %err, "Lease renewal failed");
				entry.state = LeaseState::Unauthenticated;
				entry.lease = None;
				Err(err)
			}
		}
	}

	/// Set the state, returning the one it replaced.
	fn set_state(&self, installation: &InstallationId, state: LeaseState) -> LeaseState {
		let mut entries = self.entries();
		std::mem::replace(&mut entries.entry(installation.clone()).or_default().state, state)
	}

	/// Discard the current lease after the backend rejected it. The next
	/// `acquire` performs a fresh exchange. Revoked installations stay revoked.
	#[instrument(skip(self), fields(installation = %installation))]
	pub async fn invalidate(&self, installation: &InstallationId) {
		let mut entries = self.entries();
		if let Some(entry) = entries.get_mut(installation) {
			if entry.state != LeaseState::Revoked && entry.lease.take().is_some() {
				entry.state = LeaseState::Unauthenticated;
				info!("Invalidated cached lease");
			}
		}
	}

	/// Move the installation to the terminal `Revoked` state.
	#[instrument(skip(self), fields(installation = %installation))]
	pub async fn revoke(&self, installation: &InstallationId) {
		let mut entries = self.entries();
		let entry = entries.entry(installation.clone()).or_default();
		entry.state = LeaseState::Revoked;
		entry.lease = None;
		info!("Installation revoked");
	}

	/// Drop all state for an installation that no longer exists.
	pub async fn forget(&self, installation: &InstallationId) {
		self.entries().remove(installation);
		self.renewal_locks.lock().await.remove(installation);
		debug!(installation = %installation, "Forgot installation");
	}

	/// Observe the lifecycle state of an installation.
	pub async fn state(&self, installation: &InstallationId) -> LeaseState {
		let entries = self.entries();
		match entries.get(installation) {
			None => LeaseState::Unauthenticated,
			Some(Entry {
				state: LeaseState::Active,
				lease: Some(lease),
			}) if !lease.is_usable(self.refresh_margin) => LeaseState::Expiring,
			Some(entry) => entry.state,
		}
	}
}

/// Restores the pre-exchange state when `acquire` is dropped mid-exchange.
struct ExchangeGuard<'a> {
	manager: &'a AuthManager,
	installation: &'a InstallationId,
	previous: LeaseState,
	armed: bool,
}

impl Drop for ExchangeGuard<'_> {
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		let mut entries = self.manager.entries();
		if let Some(entry) = entries.get_mut(self.installation) {
			if entry.state == LeaseState::Authenticating {
				entry.state = self.previous;
				debug!(installation = %self.installation, state = %self.previous, "Exchange cancelled");
			}
		}
	}
}

/// A failure the backend answered with a definitive refusal, as opposed to a
/// transient or purely local failure.
fn is_rejection(err: &ScmError) -> bool {
	err.status().is_some() && err.retry_class() == RetryClass::Never
}

fn into_auth_expired(err: ScmError) -> ScmError {
	if err.is_auth_expired() {
		return err;
	}
	let status = err.status();
	let mapped = ScmError::auth_expired(format!("token exchange rejected: {err}"));
	match status {
		Some(code) => mapped.with_status(code),
		None => mapped,
	}
}

fn revoked(installation: &InstallationId) -> ScmError {
	ScmError::auth_expired(format!("installation {installation} has been revoked"))
}
