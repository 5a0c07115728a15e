// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;

use crate::env::{EnvValueError, RequiredSecretError, SecretEnvError};

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("{var} not set")]
	Missing { var: String },

	#[error("invalid {field}: {reason}")]
	Invalid { field: String, reason: String },

	#[error("unsupported provider: {0}")]
	UnsupportedProvider(String),

	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {path}: {message}")]
	Parse { path: PathBuf, message: String },

	#[error(transparent)]
	Secret(#[from] RequiredSecretError),

	#[error(transparent)]
	SecretEnv(#[from] SecretEnvError),

	#[error(transparent)]
	Env(#[from] EnvValueError),
}

impl ConfigError {
	pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::Invalid {
			field: field.into(),
			reason: reason.into(),
		}
	}

	pub fn missing(var: impl Into<String>) -> Self {
		Self::Missing { var: var.into() }
	}
}
