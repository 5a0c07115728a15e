// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Configuration primitives shared by the provider adapters.
//!
//! - [`load_secret_env`] / [`require_secret_env`]: read credential material
//!   from `VAR` or from the file named by `VAR_FILE`
//! - [`env_parse`]: read and parse a non-secret tunable such as a timeout
//! - [`validate_base_url`]: the HTTPS-only rule every backend base URL obeys
//! - [`ConfigError`]: what goes wrong while assembling any of the above

pub mod base_url;
pub mod env;
pub mod error;

pub use gitbridge_common_secret::{Secret, SecretString, REDACTED};

pub use env::{
	env_parse, load_secret_env, require_secret_env, EnvValueError, RequiredSecretError,
	SecretEnvError,
};
pub use base_url::validate_base_url;
pub use error::ConfigError;
