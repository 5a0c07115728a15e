// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for gitbridge.
//!
//! This crate provides:
//! - A pre-configured HTTP client with a consistent User-Agent and a per-call
//!   timeout
//! - The retry engine applied to every outbound hosting-provider call

mod client;
mod retry;

pub use client::{
	builder, new_client_with_timeout, user_agent, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use retry::{
	retry, retry_with_budget, Idempotency, InvalidRetryConfig, RetryBudget, RetryClass, RetryConfig,
	RetryableError,
};
