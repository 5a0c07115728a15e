// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Redacting wrapper for credential material.
//!
//! Installation tokens, OAuth refresh tokens, GitHub App private keys and
//! OAuth client secrets all flow through [`Secret<T>`]. The wrapper:
//!
//! - prints `[REDACTED]` for both `Debug` and `Display`, so `tracing` fields
//!   written with `%` or `?` never leak the value
//! - serializes as `"[REDACTED]"` so configuration dumps are safe
//! - zeroizes its memory on drop
//! - has no `Deref`; callers must write `.expose()` to read the value
//!
//! ```
//! use gitbridge_common_secret::SecretString;
//!
//! let token = SecretString::new("ghs_installation_token".to_string());
//! assert_eq!(format!("{token}"), "[REDACTED]");
//! assert_eq!(token.expose(), "ghs_installation_token");
//! ```

use std::fmt;

use zeroize::Zeroize;

/// Placeholder written wherever a secret would otherwise be printed.
pub const REDACTED: &str = "[REDACTED]";

/// A value that must never be logged or serialized in clear text.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct Secret<T>
where
	T: Zeroize,
{
	inner: T,
}

/// The common case: a secret string such as a bearer token.
pub type SecretString = Secret<String>;

impl<T> Secret<T>
where
	T: Zeroize,
{
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	/// Read the wrapped value. Every call site is a place where the secret
	/// leaves the wrapper, so keep them few.
	pub fn expose(&self) -> &T {
		&self.inner
	}
}

impl SecretString {
	/// Whether the wrapped string is empty (checked without exposing it).
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Secret::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Secret::new(value.to_string())
	}
}

impl<T> Clone for Secret<T>
where
	T: Zeroize + Clone,
{
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T> fmt::Debug for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Secret").field(&REDACTED).finish()
	}
}

impl<T> fmt::Display for Secret<T>
where
	T: Zeroize,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl<T> PartialEq for Secret<T>
where
	T: Zeroize + PartialEq,
{
	fn eq(&self, other: &Self) -> bool {
		self.inner == other.inner
	}
}

impl<T> Eq for Secret<T> where T: Zeroize + Eq {}

#[cfg(feature = "serde")]
mod serde_impl {
	use serde::{Deserialize, Deserializer, Serialize, Serializer};
	use zeroize::Zeroize;

	use super::{Secret, REDACTED};

	impl<T> Serialize for Secret<T>
	where
		T: Zeroize,
	{
		fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			serializer.serialize_str(REDACTED)
		}
	}

	impl<'de, T> Deserialize<'de> for Secret<T>
	where
		T: Deserialize<'de> + Zeroize,
	{
		fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
		where
			D: Deserializer<'de>,
		{
			T::deserialize(deserializer).map(Secret::new)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn debug_and_display_hide_token() {
		let token = SecretString::from("glpat-abcdef");
		assert_eq!(format!("{token}"), REDACTED);
		assert_eq!(format!("{token:?}"), "Secret(\"[REDACTED]\")");
	}

	#[test]
	fn expose_returns_value() {
		let token = SecretString::from("glpat-abcdef");
		assert_eq!(token.expose(), "glpat-abcdef");
		assert!(!token.is_empty());
		assert!(SecretString::from("").is_empty());
	}

	#[test]
	fn optional_secret_in_struct_debug_is_redacted() {
		#[derive(Debug)]
		#[allow(dead_code)]
		struct Grant {
			refresh_token: Option<SecretString>,
		}

		let grant = Grant {
			refresh_token: Some(SecretString::from("refresh-me")),
		};
		let debug = format!("{grant:?}");
		assert!(!debug.contains("refresh-me"));
		assert!(debug.contains(REDACTED));
	}

	#[test]
	fn serialize_is_redacted_and_deserialize_keeps_value() {
		let token = SecretString::from("x-token-auth");
		let json = serde_json::to_string(&token).unwrap();
		assert_eq!(json, "\"[REDACTED]\"");

		let parsed: SecretString = serde_json::from_str("\"x-token-auth\"").unwrap();
		assert_eq!(parsed, token);
	}

	proptest! {
		#[test]
		fn formatting_never_leaks(inner in "[a-zA-Z0-9_-]{6,48}") {
			prop_assume!(!inner.contains("REDACTED"));
			prop_assume!(!inner.contains("Secret"));

			let secret = SecretString::new(inner.clone());
			let debug_out = format!("{:?}", secret);
			let display_out = format!("{}", secret);
			prop_assert!(!debug_out.contains(&inner));
			prop_assert!(!display_out.contains(&inner));
			prop_assert!(!serde_json::to_string(&secret).unwrap().contains(&inner));
		}
	}
}
