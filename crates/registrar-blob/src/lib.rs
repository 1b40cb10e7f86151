//! Payment evidence storage and time-limited read access.
//!
//! [`BlobInterface`] backends store artifacts by path inside a private bucket.
//! Uploads never overwrite. Reads from outside the service go through
//! [`ArtifactAccessIssuer`], which hands out signed, expiring URLs and checks
//! them when they are presented.

use async_trait::async_trait;
use registrar_types::{ConfigSchema, ImplementationRegistry, WorkflowError};
use thiserror::Error;

mod issuer;
pub mod signing;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use issuer::ArtifactAccessIssuer;
pub use signing::{SignatureParams, SignedUrl, SigningError, UrlSigner};

#[derive(Debug, Error)]
pub enum BlobError {
	#[error("No object at '{0}'")]
	NotFound(String),
	#[error("An object already exists at '{0}'")]
	AlreadyExists(String),
	#[error("Invalid object path '{0}'")]
	InvalidPath(String),
	#[error("Requested lifetime of {requested}s is outside 1..={max}s")]
	InvalidTtl { requested: u64, max: u64 },
	/// The backend could not be reached or failed mid-operation.
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
	/// A presented URL failed verification.
	#[error("Access denied: {0}")]
	Denied(#[from] SigningError),
}

impl From<BlobError> for WorkflowError {
	fn from(err: BlobError) -> Self {
		match err {
			BlobError::NotFound(path) => WorkflowError::NotFound(format!("artifact {}", path)),
			// A denied URL reveals nothing about the artifact.
			BlobError::Denied(_) => WorkflowError::NotFound("artifact".to_string()),
			BlobError::Backend(_) | BlobError::Configuration(_) => {
				WorkflowError::StoreUnavailable(err.to_string())
			},
			BlobError::AlreadyExists(_) | BlobError::InvalidPath(_) | BlobError::InvalidTtl { .. } => {
				WorkflowError::Validation(err.to_string())
			},
		}
	}
}

/// Object storage backend. Keys are `bucket/path`.
#[async_trait]
pub trait BlobInterface: Send + Sync {
	/// Stores a new object. Fails with [`BlobError::AlreadyExists`] if the
	/// key is taken.
	async fn upload(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

	async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError>;

	async fn exists(&self, key: &str) -> Result<bool, BlobError>;

	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

pub type BlobFactory = fn(&toml::Value) -> Result<Box<dyn BlobInterface>, BlobError>;

pub trait BlobRegistry: ImplementationRegistry<Factory = BlobFactory> {}

pub fn get_all_implementations() -> Vec<(&'static str, BlobFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// A blob backend scoped to one bucket, with path checks.
pub struct BlobService {
	backend: Box<dyn BlobInterface>,
	bucket: String,
}

impl BlobService {
	pub fn new(backend: Box<dyn BlobInterface>, bucket: impl Into<String>) -> Self {
		Self {
			backend,
			bucket: bucket.into(),
		}
	}

	pub fn bucket(&self) -> &str {
		&self.bucket
	}

	/// Paths are relative, `/`-separated and may not climb out of the bucket.
	fn key(&self, path: &str) -> Result<String, BlobError> {
		let valid = !path.is_empty()
			&& !path.starts_with('/')
			&& !path.contains('\\')
			&& path
				.split('/')
				.all(|segment| !segment.is_empty() && segment != "." && segment != "..");
		if !valid {
			return Err(BlobError::InvalidPath(path.to_string()));
		}
		Ok(format!("{}/{}", self.bucket, path))
	}

	pub async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
		let key = self.key(path)?;
		self.backend.upload(&key, bytes).await.map_err(|e| match e {
			BlobError::AlreadyExists(_) => BlobError::AlreadyExists(path.to_string()),
			e => e,
		})
	}

	pub async fn download(&self, path: &str) -> Result<Vec<u8>, BlobError> {
		let key = self.key(path)?;
		self.backend.download(&key).await.map_err(|e| match e {
			BlobError::NotFound(_) => BlobError::NotFound(path.to_string()),
			e => e,
		})
	}

	pub async fn exists(&self, path: &str) -> Result<bool, BlobError> {
		let key = self.key(path)?;
		self.backend.exists(&key).await
	}
}
