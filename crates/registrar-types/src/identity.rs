//! Requester identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SecretString;

/// A key under which orders can be looked up.
///
/// The same person may be known by a self-declared handle, an identity
/// provider id, or both. The two are not reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IdentityKey {
	/// Self-declared handle remembered from a previous submission.
	Handle(String),
	/// Stable identifier from the identity provider.
	Auth(String),
}

impl IdentityKey {
	pub fn value(&self) -> &str {
		match self {
			IdentityKey::Handle(v) | IdentityKey::Auth(v) => v,
		}
	}

	pub fn kind(&self) -> &'static str {
		match self {
			IdentityKey::Handle(_) => "handle",
			IdentityKey::Auth(_) => "auth",
		}
	}
}

impl fmt::Display for IdentityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind(), self.value())
	}
}

/// An authenticated account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
	pub id: String,
	pub email: String,
}

/// Email/password credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
	pub email: String,
	pub password: SecretString,
}

impl Credentials {
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			email: email.into(),
			password: SecretString::new(password.into()),
		}
	}
}

/// A handle persisted locally after a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedHandle {
	pub handle: String,
	/// Unix timestamp at which the handle was remembered.
	pub remembered_at: u64,
}

impl RememberedHandle {
	/// A zero lifetime means the handle never expires.
	pub fn is_expired(&self, now: u64, lifetime_secs: u64) -> bool {
		lifetime_secs > 0 && now >= self.remembered_at.saturating_add(lifetime_secs)
	}
}
