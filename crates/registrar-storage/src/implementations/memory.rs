//! In-memory storage backend.
//!
//! Entries live in a `HashMap` behind a read-write lock and are lost on
//! restart. Time-to-live is honored: expired entries read as absent and are
//! dropped by `cleanup_expired`.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use registrar_types::{ConfigSchema, ImplementationRegistry, Schema, SchemaError};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
	value: Vec<u8>,
	expires_at: Option<Instant>,
}

impl Entry {
	fn is_live(&self, now: Instant) -> bool {
		self.expires_at.is_none_or(|at| now < at)
	}
}

pub struct MemoryStorage {
	store: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: RwLock::new(HashMap::new()),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store
			.get(key)
			.filter(|entry| entry.is_live(Instant::now()))
			.map(|entry| entry.value.clone())
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires_at = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		self.store
			.write()
			.await
			.insert(key.to_string(), Entry { value, expires_at });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.store.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store
			.get(key)
			.is_some_and(|entry| entry.is_live(Instant::now())))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut store = self.store.write().await;
		let before = store.len();
		store.retain(|_, entry| entry.is_live(now));
		Ok(before - store.len())
	}
}

/// The memory backend takes no options.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		Schema::new().validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
