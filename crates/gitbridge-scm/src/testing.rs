// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! In-memory [`GitProvider`] with scripted failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use gitbridge_scm_core::{
	FullName, GitProvider, InstallationId, OrganizationType, PageRequest, ProviderKind,
	PullRequestRequest, PullRequestResult, RemoteFile, RemoteOrganization, RemoteRepository,
	RemoteRepositoryPage, Result, ScmError,
};

pub(crate) struct FakeProvider {
	kind: ProviderKind,
	repos: Vec<RemoteRepository>,
	failures: Mutex<VecDeque<ScmError>>,
	hang: AtomicBool,
	calls: AtomicU32,
	invalidations: AtomicU32,
	disconnects: AtomicU32,
}

impl FakeProvider {
	pub fn new(kind: ProviderKind) -> Self {
		let repo = |name: &str| RemoteRepository {
			name: name.to_string(),
			full_name: format!("tupe12334/{name}"),
			url: format!("http://localhost/{name}"),
			default_branch: "main".to_string(),
			private: false,
			admin: true,
		};
		Self {
			kind,
			repos: vec![repo("ofek"), repo("test")],
			failures: Mutex::new(VecDeque::new()),
			hang: AtomicBool::new(false),
			calls: AtomicU32::new(0),
			invalidations: AtomicU32::new(0),
			disconnects: AtomicU32::new(0),
		}
	}

	/// Queue errors returned by the next calls, in order.
	pub fn fail_next(&self, errors: impl IntoIterator<Item = ScmError>) {
		self.failures.lock().unwrap().extend(errors);
	}

	/// Make every call pend forever.
	pub fn hang(&self) {
		self.hang.store(true, Ordering::SeqCst);
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn invalidations(&self) -> u32 {
		self.invalidations.load(Ordering::SeqCst)
	}

	pub fn disconnects(&self) -> u32 {
		self.disconnects.load(Ordering::SeqCst)
	}

	async fn attempt(&self) -> Result<()> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.hang.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		let next = self.failures.lock().unwrap().pop_front();
		match next {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

#[async_trait]
impl GitProvider for FakeProvider {
	fn kind(&self) -> ProviderKind {
		self.kind
	}

	fn installation_url(&self, state: &str) -> String {
		format!("https://example.com/install?state={state}")
	}

	async fn get_organization(&self, _installation: &InstallationId) -> Result<RemoteOrganization> {
		self.attempt().await?;
		Ok(RemoteOrganization {
			name: "testGitRemoteOrganization".to_string(),
			org_type: OrganizationType::Organization,
		})
	}

	async fn list_repositories(
		&self,
		_installation: &InstallationId,
		page: PageRequest,
	) -> Result<RemoteRepositoryPage> {
		self.attempt().await?;
		let repos = self
			.repos
			.iter()
			.skip(page.offset() as usize)
			.take(page.page_size() as usize)
			.cloned()
			.collect();
		Ok(page.assemble(repos, self.repos.len() as u64))
	}

	async fn get_repository(
		&self,
		_installation: &InstallationId,
		full_name: &FullName,
	) -> Result<RemoteRepository> {
		self.attempt().await?;
		self
			.repos
			.iter()
			.find(|r| r.full_name == full_name.to_string())
			.cloned()
			.ok_or_else(|| ScmError::not_found(format!("{full_name} not found")).with_status(404))
	}

	async fn get_file(
		&self,
		_installation: &InstallationId,
		_full_name: &FullName,
		path: &str,
		_git_ref: Option<&str>,
	) -> Result<RemoteFile> {
		self.attempt().await?;
		Ok(RemoteFile {
			name: "exampleGithubFileName".to_string(),
			path: path.to_string(),
			content: "exampleContent".to_string(),
			html_url: "exampleHtmlUrl".to_string(),
		})
	}

	async fn create_pull_request(
		&self,
		_installation: &InstallationId,
		request: &PullRequestRequest,
	) -> Result<PullRequestResult> {
		self.attempt().await?;
		Ok(PullRequestResult {
			url: format!("http://localhost/{}/pull/1", request.full_name),
			number: Some(1),
		})
	}

	async fn invalidate_credentials(&self, _installation: &InstallationId) {
		self.invalidations.fetch_add(1, Ordering::SeqCst);
	}

	async fn disconnect(&self, _installation: &InstallationId) -> Result<()> {
		self.disconnects.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}
