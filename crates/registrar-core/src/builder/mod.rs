//! Builder pattern for constructing registrar engines.
//!
//! Composes a [`RegistrarEngine`] from configuration and factory maps for the
//! pluggable storage, blob and identity backends. Each configured
//! implementation is created through its factory; the one named `primary`
//! is used.

use crate::engine::RegistrarEngine;
use registrar_blob::{
	ArtifactAccessIssuer, BlobError, BlobInterface, BlobService, UrlSigner,
};
use registrar_config::Config;
use registrar_identity::{HandleStore, IdentityError, IdentityProvider, IdentityResolver};
use registrar_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during registrar engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Factory functions for each pluggable component, keyed by implementation
/// name.
pub struct RegistrarFactories<SF, BF, IF> {
	pub storage_factories: HashMap<String, SF>,
	pub blob_factories: HashMap<String, BF>,
	pub identity_factories: HashMap<String, IF>,
}

/// Identity resolution and the storage behind remembered handles.
pub struct IdentityComponents {
	pub resolver: Arc<IdentityResolver>,
	pub handle_storage: Arc<StorageService>,
}

/// Creates every configured implementation of one component and returns the
/// primary one.
fn load_primary<T, E, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<Box<T>, BuilderError>
where
	T: ?Sized,
	E: Display,
	F: Fn(&toml::Value) -> Result<Box<T>, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = name == primary;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.as_str(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::Config(format!(
			"No valid {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

/// Builder for constructing a RegistrarEngine with pluggable implementations.
pub struct RegistrarBuilder {
	config: Config,
}

impl RegistrarBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the identity resolver from the `[identity]` section.
	///
	/// Remembered handles get a storage backend of their own, chosen by
	/// `identity.handle_store` among `identity.handle_stores`.
	pub fn build_identity<SF, IF>(
		&self,
		storage_factories: &HashMap<String, SF>,
		identity_factories: &HashMap<String, IF>,
	) -> Result<IdentityComponents, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		IF: Fn(&toml::Value) -> Result<Box<dyn IdentityProvider>, IdentityError>,
	{
		let identity = &self.config.identity;
		let provider = load_primary(
			"identity",
			&identity.primary,
			&identity.implementations,
			identity_factories,
		)?;
		let handle_backend = load_primary(
			"handle_store",
			&identity.handle_store,
			&identity.handle_stores,
			storage_factories,
		)?;

		let handle_storage = Arc::new(StorageService::new(handle_backend));
		let handles = Arc::new(HandleStore::new(
			handle_storage.clone(),
			identity.handle_ttl_seconds,
		));
		Ok(IdentityComponents {
			resolver: Arc::new(IdentityResolver::new(Arc::from(provider), handles)),
			handle_storage,
		})
	}

	fn build_issuer(&self, backend: Box<dyn BlobInterface>) -> Result<ArtifactAccessIssuer, BuilderError> {
		let blob = &self.config.blob;
		let base_url = Url::parse(&blob.public_base_url).map_err(|e| {
			BuilderError::Config(format!(
				"Invalid public_base_url '{}': {}",
				blob.public_base_url, e
			))
		})?;

		let blobs = Arc::new(BlobService::new(backend, blob.bucket.clone()));
		let signer = UrlSigner::new(
			blob.signing_secret.clone(),
			blob.bucket.clone(),
			base_url,
			Duration::from_secs(blob.clock_skew_seconds),
		);
		Ok(ArtifactAccessIssuer::new(
			blobs,
			signer,
			Duration::from_secs(blob.max_ttl_seconds),
		))
	}

	/// Builds the RegistrarEngine using factories for each component type.
	pub fn build<SF, BF, IF>(
		self,
		factories: RegistrarFactories<SF, BF, IF>,
	) -> Result<RegistrarEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		BF: Fn(&toml::Value) -> Result<Box<dyn BlobInterface>, BlobError>,
		IF: Fn(&toml::Value) -> Result<Box<dyn IdentityProvider>, IdentityError>,
	{
		let storage_backend = load_primary(
			"storage",
			&self.config.storage.primary,
			&self.config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(storage_backend));

		let blob_backend = load_primary(
			"blob",
			&self.config.blob.primary,
			&self.config.blob.implementations,
			&factories.blob_factories,
		)?;
		let issuer = Arc::new(self.build_issuer(blob_backend)?);

		let identity =
			self.build_identity(&factories.storage_factories, &factories.identity_factories)?;

		Ok(RegistrarEngine::new(self.config, storage, issuer, identity))
	}
}

/// Factory maps holding every built-in implementation.
#[cfg(test)]
pub(crate) fn builtin_factories() -> RegistrarFactories<
	registrar_storage::StorageFactory,
	registrar_blob::BlobFactory,
	registrar_identity::IdentityFactory,
> {
	RegistrarFactories {
		storage_factories: registrar_storage::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		blob_factories: registrar_blob::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
		identity_factories: registrar_identity::get_all_implementations()
			.into_iter()
			.map(|(name, factory)| (name.to_string(), factory))
			.collect(),
	}
}
