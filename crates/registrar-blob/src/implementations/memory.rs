//! In-memory blob store for tests and local runs.

use crate::{BlobError, BlobInterface};
use async_trait::async_trait;
use registrar_types::{ConfigSchema, ImplementationRegistry, Schema, SchemaError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryBlobStore {
	objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl BlobInterface for MemoryBlobStore {
	async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
		match self.objects.write().await.entry(key.to_string()) {
			Entry::Occupied(_) => Err(BlobError::AlreadyExists(key.to_string())),
			Entry::Vacant(slot) => {
				slot.insert(bytes);
				Ok(())
			},
		}
	}

	async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError> {
		self.objects
			.read()
			.await
			.get(key)
			.cloned()
			.ok_or_else(|| BlobError::NotFound(key.to_string()))
	}

	async fn exists(&self, key: &str) -> Result<bool, BlobError> {
		Ok(self.objects.read().await.contains_key(key))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryBlobSchema)
	}
}

pub struct MemoryBlobSchema;

impl ConfigSchema for MemoryBlobSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		Schema::new().validate(config)
	}
}

pub fn create_blob_store(config: &toml::Value) -> Result<Box<dyn BlobInterface>, BlobError> {
	MemoryBlobSchema
		.validate(config)
		.map_err(|e| BlobError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryBlobStore::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::BlobFactory;

	fn factory() -> Self::Factory {
		create_blob_store
	}
}

impl crate::BlobRegistry for Registry {}
