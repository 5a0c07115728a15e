// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Canonical page requests and page assembly.
//!
//! Adapters translate their backend's native paging into a [`PageRequest`]
//! and hand the fetched items back through [`PageRequest::assemble`], which is
//! the only place a [`RemoteRepositoryPage`] gets built.

use crate::error::ScmError;
use crate::types::{RemoteRepository, RemoteRepositoryPage};

/// Largest page size any supported backend accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
	page: u32,
	page_size: u32,
}

impl PageRequest {
	pub fn new(page: u32, page_size: u32) -> Result<Self, ScmError> {
		if page == 0 {
			return Err(ScmError::validation("page is 1-indexed"));
		}
		if page_size == 0 || page_size > MAX_PAGE_SIZE {
			return Err(ScmError::validation(format!(
				"page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
			)));
		}
		Ok(Self { page, page_size })
	}

	pub fn page(&self) -> u32 {
		self.page
	}

	pub fn page_size(&self) -> u32 {
		self.page_size
	}

	/// Number of items that precede this page.
	pub fn offset(&self) -> u64 {
		u64::from(self.page - 1) * u64::from(self.page_size)
	}

	/// Assemble the canonical page.
	///
	/// Extra items are dropped so `repos.len() <= page_size` holds even when
	/// a backend ignores the requested size. The total never drops below
	/// what this page proves exists; an empty page past the end keeps the
	/// reported total.
	pub fn assemble(&self, mut repos: Vec<RemoteRepository>, total: u64) -> RemoteRepositoryPage {
		repos.truncate(self.page_size as usize);

		let total_repos = if repos.is_empty() {
			total
		} else {
			total.max(self.offset() + repos.len() as u64)
		};

		RemoteRepositoryPage {
			repos,
			total_repos,
			page_size: self.page_size,
			current_page: self.page,
		}
	}
}
