//! Builder for in-memory configurations used by tests and local runs.

use crate::{
	ApiConfig, BlobConfig, Config, IdentityConfig, RegistrarConfig, StorageConfig, SyncConfig,
};
use registrar_types::{Catalog, Department, SecretString, University};
use std::collections::HashMap;

/// Builds a `Config` wired to the memory backends.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	registrar_id: String,
	poll_interval_seconds: u64,
	preview_ttl_seconds: u64,
	require_artifact: bool,
	handle_ttl_seconds: u64,
	catalog: Catalog,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// One university (3) with one department (7).
	pub fn new() -> Self {
		Self {
			registrar_id: "registrar-test".to_string(),
			poll_interval_seconds: 5,
			preview_ttl_seconds: 60,
			require_artifact: true,
			handle_ttl_seconds: 0,
			catalog: Catalog {
				universities: vec![University {
					id: 3,
					name: "Test University".to_string(),
				}],
				departments: vec![Department {
					id: 7,
					university_id: 3,
					name: "Software Engineering".to_string(),
					price_birr: 500,
				}],
			},
			api: None,
		}
	}

	pub fn registrar_id(mut self, id: impl Into<String>) -> Self {
		self.registrar_id = id.into();
		self
	}

	pub fn poll_interval_seconds(mut self, seconds: u64) -> Self {
		self.poll_interval_seconds = seconds;
		self
	}

	pub fn preview_ttl_seconds(mut self, seconds: u64) -> Self {
		self.preview_ttl_seconds = seconds;
		self
	}

	pub fn require_artifact(mut self, required: bool) -> Self {
		self.require_artifact = required;
		self
	}

	pub fn handle_ttl_seconds(mut self, seconds: u64) -> Self {
		self.handle_ttl_seconds = seconds;
		self
	}

	pub fn catalog(mut self, catalog: Catalog) -> Self {
		self.catalog = catalog;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		let memory = || {
			HashMap::from([(
				"memory".to_string(),
				toml::Value::Table(toml::Table::new()),
			)])
		};

		Config {
			registrar: RegistrarConfig {
				id: self.registrar_id,
			},
			storage: StorageConfig {
				primary: "memory".to_string(),
				implementations: memory(),
				cleanup_interval_seconds: 60,
			},
			blob: BlobConfig {
				primary: "memory".to_string(),
				implementations: memory(),
				bucket: "payment".to_string(),
				public_base_url: "http://127.0.0.1:3000".to_string(),
				signing_secret: SecretString::from("test-signing-secret"),
				preview_ttl_seconds: self.preview_ttl_seconds,
				max_ttl_seconds: 3600,
				clock_skew_seconds: 0,
				require_artifact: self.require_artifact,
				max_artifact_bytes: 1024 * 1024,
			},
			identity: IdentityConfig {
				primary: "memory".to_string(),
				implementations: memory(),
				handle_store: "memory".to_string(),
				handle_stores: memory(),
				handle_ttl_seconds: self.handle_ttl_seconds,
			},
			sync: SyncConfig {
				poll_interval_seconds: self.poll_interval_seconds,
				request_timeout_seconds: 10,
			},
			catalog: self.catalog,
			api: self.api,
		}
	}
}
