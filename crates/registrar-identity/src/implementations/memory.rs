//! In-process email/password identity provider.
//!
//! Accounts are kept in memory. Passwords are stored as salted SHA-256
//! digests and compared in constant time.

use crate::{IdentityError, IdentityProvider};
use async_trait::async_trait;
use registrar_types::{
	AuthIdentity, ConfigSchema, Credentials, FieldType, ImplementationRegistry, Schema,
	SchemaError,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use subtle::ConstantTimeEq;
use tokio::sync::{watch, RwLock};
use tracing::info;

struct Account {
	identity: AuthIdentity,
	salt: String,
	digest: Vec<u8>,
}

fn digest(salt: &str, credentials: &Credentials) -> Vec<u8> {
	credentials.password.with_exposed(|password| {
		let mut hasher = Sha256::new();
		hasher.update(salt.as_bytes());
		hasher.update(password.as_bytes());
		hasher.finalize().to_vec()
	})
}

fn normalize_email(email: &str) -> Result<String, IdentityError> {
	let email = email.trim().to_lowercase();
	match email.split_once('@') {
		Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
		_ => Err(IdentityError::InvalidEmail(email)),
	}
}

pub struct MemoryIdentityProvider {
	accounts: RwLock<HashMap<String, Account>>,
	session: watch::Sender<Option<AuthIdentity>>,
	min_password_length: usize,
}

impl MemoryIdentityProvider {
	pub fn new(min_password_length: usize) -> Self {
		let (session, _) = watch::channel(None);
		Self {
			accounts: RwLock::new(HashMap::new()),
			session,
			min_password_length,
		}
	}
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryIdentitySchema)
	}

	async fn sign_up(&self, credentials: &Credentials) -> Result<AuthIdentity, IdentityError> {
		let email = normalize_email(&credentials.email)?;
		if credentials.password.len() < self.min_password_length {
			return Err(IdentityError::WeakPassword {
				min: self.min_password_length,
			});
		}

		let mut accounts = self.accounts.write().await;
		if accounts.contains_key(&email) {
			return Err(IdentityError::AlreadyRegistered(email));
		}

		let salt = uuid::Uuid::new_v4().simple().to_string();
		let identity = AuthIdentity {
			id: uuid::Uuid::new_v4().to_string(),
			email: email.clone(),
		};
		accounts.insert(
			email,
			Account {
				identity: identity.clone(),
				digest: digest(&salt, credentials),
				salt,
			},
		);
		drop(accounts);

		info!(identity = %identity.id, "Account created");
		self.session.send_replace(Some(identity.clone()));
		Ok(identity)
	}

	async fn sign_in(&self, credentials: &Credentials) -> Result<AuthIdentity, IdentityError> {
		let email = normalize_email(&credentials.email)?;
		let identity = {
			let accounts = self.accounts.read().await;
			let account = accounts
				.get(&email)
				.ok_or(IdentityError::InvalidCredentials)?;
			let candidate = digest(&account.salt, credentials);
			if !bool::from(account.digest.ct_eq(&candidate)) {
				return Err(IdentityError::InvalidCredentials);
			}
			account.identity.clone()
		};

		self.session.send_replace(Some(identity.clone()));
		Ok(identity)
	}

	async fn sign_out(&self) -> Result<(), IdentityError> {
		self.session.send_replace(None);
		Ok(())
	}

	async fn current_identity(&self) -> Result<Option<AuthIdentity>, IdentityError> {
		Ok(self.session.borrow().clone())
	}

	fn subscribe(&self) -> watch::Receiver<Option<AuthIdentity>> {
		self.session.subscribe()
	}
}

pub struct MemoryIdentitySchema;

impl ConfigSchema for MemoryIdentitySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		Schema::new()
			.optional(
				"min_password_length",
				FieldType::Integer {
					min: Some(1),
					max: Some(1024),
				},
			)
			.validate(config)
	}
}

/// Options: `min_password_length` (default 6).
pub fn create_provider(config: &toml::Value) -> Result<Box<dyn crate::IdentityProvider>, IdentityError> {
	MemoryIdentitySchema
		.validate(config)
		.map_err(|e| IdentityError::Configuration(e.to_string()))?;

	let min_password_length = config
		.get("min_password_length")
		.and_then(|v| v.as_integer())
		.map(|v| v as usize)
		.unwrap_or(6);
	Ok(Box::new(MemoryIdentityProvider::new(min_password_length)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::IdentityFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl crate::IdentityRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_sign_up_then_sign_in() {
		let provider = MemoryIdentityProvider::new(6);
		let created = provider
			.sign_up(&Credentials::new("Alice@Example.com", "secret1"))
			.await
			.unwrap();
		assert_eq!(created.email, "alice@example.com");
		assert_eq!(provider.current_identity().await.unwrap(), Some(created.clone()));

		provider.sign_out().await.unwrap();
		assert_eq!(provider.current_identity().await.unwrap(), None);

		let signed_in = provider
			.sign_in(&Credentials::new("alice@example.com", "secret1"))
			.await
			.unwrap();
		assert_eq!(signed_in.id, created.id);
	}

	#[tokio::test]
	async fn test_rejects_bad_credentials() {
		let provider = MemoryIdentityProvider::new(6);
		provider
			.sign_up(&Credentials::new("bob@example.com", "secret1"))
			.await
			.unwrap();
		provider.sign_out().await.unwrap();

		assert!(matches!(
			provider
				.sign_in(&Credentials::new("bob@example.com", "secret2"))
				.await,
			Err(IdentityError::InvalidCredentials)
		));
		assert!(matches!(
			provider
				.sign_in(&Credentials::new("nobody@example.com", "secret1"))
				.await,
			Err(IdentityError::InvalidCredentials)
		));
		assert_eq!(provider.current_identity().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_sign_up_validation() {
		let provider = MemoryIdentityProvider::new(6);
		assert!(matches!(
			provider.sign_up(&Credentials::new("not-an-email", "secret1")).await,
			Err(IdentityError::InvalidEmail(_))
		));
		assert!(matches!(
			provider.sign_up(&Credentials::new("c@example.com", "abc")).await,
			Err(IdentityError::WeakPassword { min: 6 })
		));

		provider
			.sign_up(&Credentials::new("c@example.com", "secret1"))
			.await
			.unwrap();
		assert!(matches!(
			provider.sign_up(&Credentials::new("C@example.com", "secret1")).await,
			Err(IdentityError::AlreadyRegistered(_))
		));
	}

	#[tokio::test]
	async fn test_subscribers_observe_changes() {
		let provider = MemoryIdentityProvider::new(6);
		let mut changes = provider.subscribe();
		assert!(changes.borrow().is_none());

		provider
			.sign_up(&Credentials::new("d@example.com", "secret1"))
			.await
			.unwrap();
		changes.changed().await.unwrap();
		assert_eq!(
			changes.borrow_and_update().as_ref().map(|i| i.email.as_str()),
			Some("d@example.com")
		);

		provider.sign_out().await.unwrap();
		changes.changed().await.unwrap();
		assert!(changes.borrow().is_none());
	}
}
