//! Requester identity.
//!
//! Two independent sources can name the current requester: an authenticated
//! account from the [`IdentityProvider`], and a handle remembered locally by
//! the [`HandleStore`] after a successful submission. The
//! [`IdentityResolver`] combines both into a ranked list of lookup keys.

use async_trait::async_trait;
use registrar_types::{
	AuthIdentity, ConfigSchema, Credentials, ImplementationRegistry, WorkflowError,
};
use thiserror::Error;
use tokio::sync::watch;

mod handles;
mod resolver;

pub mod implementations {
	pub mod memory;
}

pub use handles::HandleStore;
pub use resolver::{describe_keys, IdentityResolver};

#[derive(Debug, Error)]
pub enum IdentityError {
	#[error("Invalid email or password")]
	InvalidCredentials,
	#[error("An account already exists for {0}")]
	AlreadyRegistered(String),
	#[error("Invalid email address: {0}")]
	InvalidEmail(String),
	#[error("Password must be at least {min} characters")]
	WeakPassword { min: usize },
	/// The provider could not be reached.
	#[error("Provider error: {0}")]
	Provider(String),
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl From<IdentityError> for WorkflowError {
	fn from(err: IdentityError) -> Self {
		match err {
			IdentityError::Provider(_) | IdentityError::Storage(_) | IdentityError::Configuration(_) => {
				WorkflowError::StoreUnavailable(err.to_string())
			},
			_ => WorkflowError::Validation(err.to_string()),
		}
	}
}

/// External identity provider (email/password accounts).
///
/// At most one identity is signed in per provider instance. Every change of
/// the signed-in identity is published to subscribers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Creates an account and signs it in.
	async fn sign_up(&self, credentials: &Credentials) -> Result<AuthIdentity, IdentityError>;

	async fn sign_in(&self, credentials: &Credentials) -> Result<AuthIdentity, IdentityError>;

	async fn sign_out(&self) -> Result<(), IdentityError>;

	async fn current_identity(&self) -> Result<Option<AuthIdentity>, IdentityError>;

	/// Receiver that observes the signed-in identity, starting with the
	/// current one.
	fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>>;
}

pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn IdentityProvider>, IdentityError>;

pub trait IdentityRegistry: ImplementationRegistry<Factory = IdentityFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, IdentityFactory)> {
	use implementations::memory;

	vec![(memory::Registry::NAME, memory::Registry::factory())]
}
