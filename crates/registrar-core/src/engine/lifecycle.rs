//! Lifecycle management for the registrar engine.

use super::{EngineError, RegistrarEngine};

impl RegistrarEngine {
	/// Performs any initialization required before running
	pub async fn initialize(&self) -> Result<(), EngineError> {
		if self.config.catalog.universities.is_empty() {
			return Err(EngineError::Config(
				"Catalog has no universities, nothing can be registered for".into(),
			));
		}
		tracing::info!(
			registrar = %self.config.registrar.id,
			universities = self.config.catalog.universities.len(),
			departments = self.config.catalog.departments.len(),
			poll_interval_secs = self.synchronizer.poll_interval().as_secs(),
			"Initializing registrar engine"
		);
		Ok(())
	}

	/// Stops synchronizers started under the engine's token.
	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!("Shutting down registrar engine");
		self.cancel.cancel();
		Ok(())
	}
}
