//! Registry trait for self-registering implementations.

/// Implemented by the `Registry` struct of every pluggable backend module.
///
/// `NAME` is the key used under `implementations` in the TOML configuration,
/// e.g. `storage.implementations.file` or `blob.implementations.memory`.
pub trait ImplementationRegistry {
	const NAME: &'static str;

	/// Factory signature of the backend family (storage, blob, identity).
	type Factory;

	fn factory() -> Self::Factory;
}
