//! Configuration for the registrar service.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${NAME}` or `${NAME:-default}`, which are substituted before
//! parsing. A file may pull in other files with `include = ["a.toml", ...]`;
//! every top-level section must then be defined in exactly one file.

#[cfg(feature = "testing")]
pub mod builders;
mod loader;

use regex::Regex;
use registrar_types::{Catalog, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "testing")]
pub use builders::ConfigBuilder;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The full error embeds the whole input; keep only the message.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Complete registrar configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub registrar: RegistrarConfig,
	pub storage: StorageConfig,
	pub blob: BlobConfig,
	pub identity: IdentityConfig,
	#[serde(default)]
	pub sync: SyncConfig,
	#[serde(default)]
	pub catalog: Catalog,
	pub api: Option<ApiConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistrarConfig {
	/// Instance identifier, used in logs.
	pub id: String,
}

/// Key/value storage backing the order repository and handle store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds between sweeps of expired entries.
	pub cleanup_interval_seconds: u64,
}

/// Payment evidence storage and signed read URLs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Private bucket holding the payment evidence.
	#[serde(default = "default_bucket")]
	pub bucket: String,
	/// Base URL under which `/artifacts/...` is served.
	pub public_base_url: String,
	/// HMAC key for read URLs.
	pub signing_secret: SecretString,
	/// Lifetime of the preview URL shown while an order is pending.
	#[serde(default = "default_preview_ttl")]
	pub preview_ttl_seconds: u64,
	/// Upper bound for any requested URL lifetime.
	#[serde(default = "default_max_ttl")]
	pub max_ttl_seconds: u64,
	/// Tolerated clock difference when checking URL expiry.
	#[serde(default)]
	pub clock_skew_seconds: u64,
	/// Whether a submission must carry payment evidence.
	#[serde(default = "default_true")]
	pub require_artifact: bool,
	#[serde(default = "default_max_artifact_bytes")]
	pub max_artifact_bytes: usize,
}

fn default_bucket() -> String {
	"payment".to_string()
}

fn default_preview_ttl() -> u64 {
	60
}

fn default_max_ttl() -> u64 {
	3600
}

fn default_true() -> bool {
	true
}

fn default_max_artifact_bytes() -> usize {
	5 * 1024 * 1024
}

/// Identity provider and remembered-handle store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Which entry of `handle_stores` persists the remembered handle.
	pub handle_store: String,
	pub handle_stores: HashMap<String, toml::Value>,
	/// Lifetime of a remembered handle. Zero keeps it until sign-out.
	#[serde(default = "default_handle_ttl")]
	pub handle_ttl_seconds: u64,
}

fn default_handle_ttl() -> u64 {
	30 * 24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
	#[serde(default = "default_poll_interval")]
	pub poll_interval_seconds: u64,
	/// Upper bound for a single poll.
	#[serde(default = "default_request_timeout")]
	pub request_timeout_seconds: u64,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			poll_interval_seconds: default_poll_interval(),
			request_timeout_seconds: default_request_timeout(),
		}
	}
}

fn default_poll_interval() -> u64 {
	5
}

fn default_request_timeout() -> u64 {
	10
}

/// HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request body size. Must leave room for the base64 artifact.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// Bearer token guarding `/api/admin`.
	pub admin_token: Option<SecretString>,
	pub cors: Option<CorsConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	10 * 1024 * 1024
}

/// Substitutes `${NAME}` and `${NAME:-default}` with environment values.
///
/// Input is capped at 1MB to keep regex scanning bounded.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		result.push_str(&input[last..whole.start()]);
		result.push_str(&value);
		last = whole.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

impl Config {
	/// Loads a configuration file and everything it includes.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;

		loader::ConfigLoader::new(base_dir).load_config(file_name).await
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.registrar.id.is_empty() {
			return Err(ConfigError::Validation("Registrar ID cannot be empty".into()));
		}

		check_primary("storage", &self.storage.primary, &self.storage.implementations)?;
		if !(1..=86400).contains(&self.storage.cleanup_interval_seconds) {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be between 1 and 86400".into(),
			));
		}

		self.validate_blob()?;

		check_primary("identity", &self.identity.primary, &self.identity.implementations)?;
		check_primary(
			"handle store",
			&self.identity.handle_store,
			&self.identity.handle_stores,
		)?;

		if self.sync.poll_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"sync.poll_interval_seconds must be at least 1".into(),
			));
		}
		if self.sync.request_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"sync.request_timeout_seconds must be at least 1".into(),
			));
		}

		self.validate_catalog()?;

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.admin_token.as_ref().is_none_or(|t| t.is_empty()) {
				return Err(ConfigError::Validation(
					"api.admin_token is required when the API is enabled".into(),
				));
			}
		}

		Ok(())
	}

	fn validate_blob(&self) -> Result<(), ConfigError> {
		let blob = &self.blob;
		check_primary("blob", &blob.primary, &blob.implementations)?;

		if blob.bucket.is_empty() {
			return Err(ConfigError::Validation("blob.bucket cannot be empty".into()));
		}
		url::Url::parse(&blob.public_base_url).map_err(|e| {
			ConfigError::Validation(format!(
				"blob.public_base_url '{}' is not a valid URL: {}",
				blob.public_base_url, e
			))
		})?;
		if blob.signing_secret.is_empty() {
			return Err(ConfigError::Validation(
				"blob.signing_secret cannot be empty".into(),
			));
		}
		if blob.preview_ttl_seconds == 0 || blob.preview_ttl_seconds > blob.max_ttl_seconds {
			return Err(ConfigError::Validation(format!(
				"blob.preview_ttl_seconds must be between 1 and max_ttl_seconds ({})",
				blob.max_ttl_seconds
			)));
		}
		if blob.max_artifact_bytes == 0 {
			return Err(ConfigError::Validation(
				"blob.max_artifact_bytes must be greater than 0".into(),
			));
		}
		Ok(())
	}

	fn validate_catalog(&self) -> Result<(), ConfigError> {
		let mut universities = HashSet::new();
		for university in &self.catalog.universities {
			if !universities.insert(university.id) {
				return Err(ConfigError::Validation(format!(
					"Duplicate university id {}",
					university.id
				)));
			}
		}

		let mut departments = HashSet::new();
		for department in &self.catalog.departments {
			if !departments.insert(department.id) {
				return Err(ConfigError::Validation(format!(
					"Duplicate department id {}",
					department.id
				)));
			}
			if !universities.contains(&department.university_id) {
				return Err(ConfigError::Validation(format!(
					"Department {} references unknown university {}",
					department.id, department.university_id
				)));
			}
		}
		Ok(())
	}
}

/// Parses, substitutes environment variables and validates.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
pub(crate) const SAMPLE_CONFIG: &str = r#"
[registrar]
id = "registrar-test"

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]

[blob]
primary = "memory"
public_base_url = "http://127.0.0.1:3000"
signing_secret = "test-secret"
[blob.implementations.memory]

[identity]
primary = "memory"
handle_store = "memory"
[identity.implementations.memory]
[identity.handle_stores.memory]

[[catalog.universities]]
id = 3
name = "North"
[[catalog.departments]]
id = 7
university_id = 3
name = "Software"
price_birr = 500

[api]
enabled = true
admin_token = "admin"
"#;
