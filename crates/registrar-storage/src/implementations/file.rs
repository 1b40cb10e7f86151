//! File-backed storage.
//!
//! One file per key under `storage_path`. Every file starts with a fixed
//! 64-byte header carrying the expiry time:
//!
//! | bytes  | content                                        |
//! |--------|------------------------------------------------|
//! | 0..4   | magic `REGS`                                   |
//! | 4..6   | format version, u16 LE                         |
//! | 6..14  | expiry, Unix seconds, u64 LE (0 = never)       |
//! | 14..64 | reserved, zero                                 |
//!
//! Writes go to a temporary file which is then renamed over the target.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use registrar_types::{
	current_timestamp, ConfigSchema, FieldType, ImplementationRegistry, Schema, SchemaError,
	StorageKey,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

const MAGIC: &[u8; 4] = b"REGS";
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 64;

fn encode_header(expires_at: u64) -> [u8; HEADER_SIZE] {
	let mut header = [0u8; HEADER_SIZE];
	header[0..4].copy_from_slice(MAGIC);
	header[4..6].copy_from_slice(&VERSION.to_le_bytes());
	header[6..14].copy_from_slice(&expires_at.to_le_bytes());
	header
}

/// Returns the expiry stored in the header, or an error for foreign files.
fn decode_header(bytes: &[u8]) -> Result<u64, StorageError> {
	if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
		return Err(StorageError::Backend("Missing storage header".into()));
	}
	let version = u16::from_le_bytes([bytes[4], bytes[5]]);
	if version > VERSION {
		return Err(StorageError::Backend(format!(
			"Unsupported file version: {}",
			version
		)));
	}
	let mut expiry = [0u8; 8];
	expiry.copy_from_slice(&bytes[6..14]);
	Ok(u64::from_le_bytes(expiry))
}

fn is_expired(expires_at: u64, now: u64) -> bool {
	expires_at != 0 && now >= expires_at
}

pub struct FileStorage {
	base_path: PathBuf,
	/// Default lifetime per namespace, applied when a write carries none.
	default_ttls: HashMap<StorageKey, Duration>,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, default_ttls: HashMap<StorageKey, Duration>) -> Self {
		Self {
			base_path,
			default_ttls,
		}
	}

	fn path_for(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':', '\\'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	fn default_ttl(&self, key: &str) -> Duration {
		key.split(':')
			.next()
			.and_then(|namespace| namespace.parse::<StorageKey>().ok())
			.and_then(|namespace| self.default_ttls.get(&namespace).copied())
			.unwrap_or(Duration::ZERO)
	}

	async fn read_live(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let data = match fs::read(self.path_for(key)).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(StorageError::NotFound)
			},
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let expires_at = decode_header(&data)?;
		if is_expired(expires_at, current_timestamp()) {
			return Err(StorageError::NotFound);
		}
		Ok(data[HEADER_SIZE..].to_vec())
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(key).await
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		let ttl = ttl.unwrap_or_else(|| self.default_ttl(key));
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs().max(1))
		};

		let mut contents = Vec::with_capacity(HEADER_SIZE + value.len());
		contents.extend_from_slice(&encode_header(expires_at));
		contents.extend_from_slice(&value);

		let path = self.path_for(key);
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, contents)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.path_for(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		match self.read_live(key).await {
			Ok(_) => Ok(true),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let now = current_timestamp();
		let mut removed = 0;
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
				continue;
			}
			let expires_at = match fs::read(&path).await.map(|data| decode_header(&data)) {
				Ok(Ok(expires_at)) => expires_at,
				Ok(Err(e)) => {
					tracing::debug!(path = %path.display(), error = %e, "Skipping unrecognized file");
					continue;
				},
				Err(e) => {
					tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable file");
					continue;
				},
			};
			if !is_expired(expires_at, now) {
				continue;
			}
			match fs::remove_file(&path).await {
				Ok(()) => removed += 1,
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired file")
				},
			}
		}
		Ok(removed)
	}
}

/// Options: `storage_path` and one `ttl_<namespace>` per storage namespace.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), SchemaError> {
		StorageKey::all()
			.fold(
				Schema::new().optional("storage_path", FieldType::String),
				|schema, key| {
					schema.optional(
						format!("ttl_{}", key.as_str()),
						FieldType::Integer {
							min: Some(0),
							max: None,
						},
					)
				},
			)
			.validate(config)
	}
}

/// Builds a file backend. `storage_path` defaults to `./data/storage`.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	let default_ttls = StorageKey::all()
		.filter_map(|key| {
			config
				.get(format!("ttl_{}", key.as_str()))
				.and_then(|v| v.as_integer())
				.map(|secs| (key, Duration::from_secs(secs as u64)))
		})
		.collect();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		default_ttls,
	)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	fn storage(dir: &TempDir) -> FileStorage {
		FileStorage::new(dir.path().to_path_buf(), HashMap::new())
	}

	#[tokio::test]
	async fn test_persists_across_instances() {
		let dir = TempDir::new().unwrap();
		storage(&dir)
			.set_bytes("orders:1", b"row".to_vec(), None)
			.await
			.unwrap();

		let reopened = storage(&dir);
		assert_eq!(reopened.get_bytes("orders:1").await.unwrap(), b"row");
		assert!(dir.path().join("orders_1.bin").exists());
		assert!(!dir.path().join("orders_1.tmp").exists());
	}

	#[tokio::test]
	async fn test_missing_and_deleted_keys() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		assert!(matches!(
			storage.get_bytes("orders:404").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("orders:404").await.unwrap());
		storage.delete("orders:404").await.unwrap();
	}

	#[tokio::test]
	async fn test_expired_entries_are_hidden_and_cleaned() {
		let dir = TempDir::new().unwrap();
		let storage = storage(&dir);
		storage.set_bytes("orders:1", b"keep".to_vec(), None).await.unwrap();

		// Write an entry whose expiry is already in the past.
		let mut stale = encode_header(current_timestamp() - 10).to_vec();
		stale.extend_from_slice(b"\"alice\"");
		std::fs::write(dir.path().join("remembered_handle_current.bin"), stale).unwrap();
		std::fs::write(dir.path().join("notes.txt"), b"unrelated").unwrap();

		assert!(!storage.exists("remembered_handle:current").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert!(storage.exists("orders:1").await.unwrap());
		assert!(dir.path().join("notes.txt").exists());
	}

	#[test]
	fn test_factory_reads_namespace_ttls() {
		let config: toml::Value = toml::from_str(
			r#"
storage_path = "/tmp/registrar"
ttl_remembered_handle = 60
"#,
		)
		.unwrap();
		assert!(create_storage(&config).is_ok());

		let typo: toml::Value = toml::from_str("ttl_quotes = 60").unwrap();
		assert!(matches!(
			create_storage(&typo),
			Err(StorageError::Configuration(_))
		));
	}

	#[test]
	fn test_default_ttl_by_namespace() {
		let storage = FileStorage::new(
			PathBuf::from("/tmp"),
			HashMap::from([(StorageKey::RememberedHandle, Duration::from_secs(60))]),
		);
		assert_eq!(
			storage.default_ttl("remembered_handle:current"),
			Duration::from_secs(60)
		);
		assert_eq!(storage.default_ttl("orders:1"), Duration::ZERO);
	}
}
