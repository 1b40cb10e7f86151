//! Filesystem blob store.
//!
//! Each object is one file under `root_path`, laid out as `bucket/path`.
//! Uploads open the target with `create_new`, so an existing object is never
//! replaced, even by a concurrent writer.

use crate::{BlobError, BlobInterface};
use async_trait::async_trait;
use registrar_types::{ConfigSchema, FieldType, ImplementationRegistry, Schema, SchemaError};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub struct FileBlobStore {
	root: PathBuf,
}

impl FileBlobStore {
	pub fn new(root: PathBuf) -> Self {
		Self { root }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		key.split('/').fold(self.root.clone(), |path, segment| path.join(segment))
	}
}

fn backend(e: std::io::Error) -> BlobError {
	BlobError::Backend(e.to_string())
}

#[async_trait]
impl BlobInterface for FileBlobStore {
	async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
		let path = self.path_for(key);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).await.map_err(backend)?;
		}

		let mut file = match fs::OpenOptions::new()
			.write(true)
			.create_new(true)
			.open(&path)
			.await
		{
			Ok(file) => file,
			Err(e) if e.kind() == ErrorKind::AlreadyExists => {
				return Err(BlobError::AlreadyExists(key.to_string()))
			},
			Err(e) => return Err(backend(e)),
		};

		if let Err(e) = async {
			file.write_all(&bytes).await?;
			file.sync_all().await
		}
		.await
		{
			// Leave no partial object behind.
			let _ = fs::remove_file(&path).await;
			return Err(backend(e));
		}
		Ok(())
	}

	async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError> {
		match fs::read(self.path_for(key)).await {
			Ok(bytes) => Ok(bytes),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
			Err(e) => Err(backend(e)),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, BlobError> {
		fs::try_exists(self.path_for(key)).await.map_err(backend)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileBlobSchema)
	}
}

pub struct FileBlobSchema;

impl ConfigSchema for FileBlobSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		Schema::new()
			.optional("root_path", FieldType::String)
			.check(|value| match value.as_str() {
				Some(path) if !path.trim().is_empty() => Ok(()),
				_ => Err("root_path cannot be empty".to_string()),
			})
			.validate(config)
	}
}

/// Builds a file blob store. `root_path` defaults to `./data/blobs`.
pub fn create_blob_store(config: &toml::Value) -> Result<Box<dyn BlobInterface>, BlobError> {
	FileBlobSchema
		.validate(config)
		.map_err(|e| BlobError::Configuration(e.to_string()))?;

	let root = config
		.get("root_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/blobs");
	Ok(Box::new(FileBlobStore::new(PathBuf::from(root))))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::BlobFactory;

	fn factory() -> Self::Factory {
		create_blob_store
	}
}

impl crate::BlobRegistry for Registry {}
