//! Multi-file configuration loading.
//!
//! The entry file may list other files under `include`. Included files are
//! resolved relative to the entry file's directory, may not include each
//! other in a cycle and may not redefine a top-level section.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub(crate) struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths read so far; a second visit means a cycle.
	visited: HashSet<PathBuf>,
	/// Top-level section name to the file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub(crate) fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	pub(crate) async fn load_config(
		&mut self,
		entry: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let entry_path = self.resolve_path(entry)?;
		let mut merged = self.read_table(&entry_path).await?;

		let includes = match merged.remove("include") {
			Some(value) => parse_includes(&value)?,
			None => Vec::new(),
		};
		self.claim_sections(&merged, &entry_path)?;

		for include in includes {
			let path = self.resolve_path(&include)?;
			let table = self.read_table(&path).await?;
			if table.contains_key("include") {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					path.display()
				)));
			}
			self.claim_sections(&table, &path)?;
			merged.extend(table);
		}

		// Re-parse through FromStr so a merged document is validated exactly
		// like a single file.
		let combined = toml::to_string(&toml::Value::Table(merged))
			.map_err(|e| ConfigError::Parse(format!("Failed to serialize combined config: {}", e)))?;
		combined.parse()
	}

	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let raw = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&raw)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn claim_sections(&mut self, table: &toml::Table, source: &Path) -> Result<(), ConfigError> {
		for key in table.keys() {
			if let Some(owner) = self.owners.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}. \
					Each top-level section must be unique across all configuration files.",
					key,
					owner.display(),
					source.display()
				)));
			}
			self.owners.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

fn parse_includes(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(items) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		_ => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::SAMPLE_CONFIG;
	use std::fs;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(temp_dir.path().join("registrar.toml"), SAMPLE_CONFIG).unwrap();

		let config = ConfigLoader::new(temp_dir.path())
			.load_config("registrar.toml")
			.await
			.unwrap();
		assert_eq!(config.registrar.id, "registrar-test");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();
		let (head, catalog) = SAMPLE_CONFIG
			.split_once("[[catalog.universities]]")
			.unwrap();
		let (catalog, api) = catalog.split_once("[api]").unwrap();

		let main = format!("include = [\"catalog.toml\"]\n{}\n[api]{}", head, api);
		fs::write(temp_dir.path().join("main.toml"), main).unwrap();
		fs::write(
			temp_dir.path().join("catalog.toml"),
			format!("[[catalog.universities]]{}", catalog),
		)
		.unwrap();

		let config = ConfigLoader::new(temp_dir.path())
			.load_config("main.toml")
			.await
			.unwrap();
		assert_eq!(config.catalog.universities.len(), 1);
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			"include = [\"dup.toml\"]\n[registrar]\nid = \"a\"\n",
		)
		.unwrap();
		fs::write(temp_dir.path().join("dup.toml"), "[registrar]\nid = \"b\"\n").unwrap();

		let err = ConfigLoader::new(temp_dir.path())
			.load_config("main.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'registrar'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("self.toml"),
			"include = [\"self.toml\"]\n[registrar]\nid = \"a\"\n",
		)
		.unwrap();

		let err = ConfigLoader::new(temp_dir.path())
			.load_config("self.toml")
			.await
			.unwrap_err();
		assert!(err.to_string().contains("already loaded"));
	}
}
