//! Dynamic factory registry for registrar implementations.
//!
//! Collects the factory functions of every built-in backend so that
//! configuration can pick implementations by name.

use registrar_blob::{BlobError, BlobInterface};
use registrar_config::Config;
use registrar_core::{IdentityComponents, RegistrarBuilder, RegistrarEngine, RegistrarFactories};
use registrar_identity::{IdentityError, IdentityProvider};
use registrar_storage::{StorageError, StorageInterface};
use std::collections::HashMap;
use std::sync::OnceLock;

// Type aliases for factory functions
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;
pub type BlobFactory = fn(&toml::Value) -> Result<Box<dyn BlobInterface>, BlobError>;
pub type IdentityFactory = fn(&toml::Value) -> Result<Box<dyn IdentityProvider>, IdentityError>;

/// Global registry for all implementation factories
#[derive(Default)]
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub blob: HashMap<String, BlobFactory>,
	pub identity: HashMap<String, IdentityFactory>,
}

impl FactoryRegistry {
	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_blob(&mut self, name: impl Into<String>, factory: BlobFactory) {
		self.blob.insert(name.into(), factory);
	}

	pub fn register_identity(&mut self, name: impl Into<String>, factory: IdentityFactory) {
		self.identity.insert(name.into(), factory);
	}
}

// Global registry instance
static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Returns the global registry, registering every built-in implementation on
/// first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::default();

		for (name, factory) in registrar_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in registrar_blob::get_all_implementations() {
			tracing::debug!("Registering blob implementation: {}", name);
			registry.register_blob(name, factory);
		}

		for (name, factory) in registrar_identity::get_all_implementations() {
			tracing::debug!("Registering identity implementation: {}", name);
			registry.register_identity(name, factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Storage factories for both the order store and the handle store.
fn storage_factories(
	config: &Config,
) -> Result<HashMap<String, StorageFactory>, Box<dyn std::error::Error>> {
	let registry = get_registry();
	let mut factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	factories.extend(build_factories!(
		registry,
		config.identity.handle_stores,
		storage,
		"handle store"
	));
	Ok(factories)
}

/// Build the registrar engine using the registry and config
pub fn build_registrar_from_config(
	config: Config,
) -> Result<RegistrarEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories = storage_factories(&config)?;
	let blob_factories = build_factories!(registry, config.blob.implementations, blob, "blob");
	let identity_factories = build_factories!(
		registry,
		config.identity.implementations,
		identity,
		"identity"
	);

	let engine = RegistrarBuilder::new(config).build(RegistrarFactories {
		storage_factories,
		blob_factories,
		identity_factories,
	})?;
	Ok(engine)
}

/// Build only the identity side, for client commands running next to the
/// requester.
pub fn build_identity_from_config(
	config: &Config,
) -> Result<IdentityComponents, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories = storage_factories(config)?;
	let identity_factories = build_factories!(
		registry,
		config.identity.implementations,
		identity,
		"identity"
	);

	Ok(RegistrarBuilder::new(config.clone())
		.build_identity(&storage_factories, &identity_factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_config::ConfigBuilder;

	#[test]
	fn test_registry_has_builtin_implementations() {
		let registry = get_registry();
		assert!(registry.storage.contains_key("memory"));
		assert!(registry.storage.contains_key("file"));
		assert!(registry.blob.contains_key("memory"));
		assert!(registry.blob.contains_key("file"));
		assert!(registry.identity.contains_key("memory"));
	}

	#[test]
	fn test_unknown_implementation_lists_available() {
		let mut config = ConfigBuilder::new().build();
		config
			.blob
			.implementations
			.insert("s3".to_string(), toml::Value::Table(toml::Table::new()));

		let err = build_registrar_from_config(config).err().unwrap();
		assert_eq!(
			err.to_string(),
			"Unknown blob implementation 's3'. Available: [file, memory]"
		);
	}

	#[test]
	fn test_builds_engine_and_client_identity() {
		let config = ConfigBuilder::new().build();
		assert!(build_identity_from_config(&config).is_ok());
		assert!(build_registrar_from_config(config).is_ok());
	}
}
