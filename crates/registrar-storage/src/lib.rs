//! Key/value storage for the registrar.
//!
//! Backends implement the byte-level [`StorageInterface`]; the rest of the
//! system goes through [`StorageService`], which adds JSON encoding and
//! `namespace:id` keys. Backends honor per-entry time-to-live.

use async_trait::async_trait;
use registrar_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// The backend could not be reached or failed mid-operation.
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Byte-level storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores a value. `None` or a zero duration keeps it indefinitely.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deleting a missing key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Drops expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// All built-in storage backends as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Typed access to a storage backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&key(namespace, id), encode(data)?, ttl)
			.await
	}

	/// Fails with [`StorageError::NotFound`] if nothing is stored under the key.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve), but an absent key is `Ok(None)`.
	/// Backend failures are still errors.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Overwrites an existing entry. Fails with `NotFound` if it is absent.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = key(namespace, id);
		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}
		self.backend.set_bytes(&key, encode(data)?, None).await
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&key(namespace, id)).await
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key(namespace, id)).await
	}

	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}
