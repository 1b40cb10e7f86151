use crate::{HandleStore, IdentityError, IdentityProvider};
use registrar_types::{truncate_id, AuthIdentity, IdentityKey};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

/// Decides which keys name the current requester.
///
/// The authenticated identity ranks first, the remembered handle second. An
/// empty result means "no identity": the requester has to register before
/// there is anything to look up. The two keys are never reconciled.
pub struct IdentityResolver {
	provider: Arc<dyn IdentityProvider>,
	handles: Arc<HandleStore>,
}

impl IdentityResolver {
	pub fn new(provider: Arc<dyn IdentityProvider>, handles: Arc<HandleStore>) -> Self {
		Self { provider, handles }
	}

	pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
		&self.provider
	}

	/// Ranked lookup keys. Source failures are logged and treated as absent.
	pub async fn resolve(&self) -> Vec<IdentityKey> {
		let mut keys = Vec::with_capacity(2);

		match self.provider.current_identity().await {
			Ok(Some(identity)) => keys.push(IdentityKey::Auth(identity.id)),
			Ok(None) => {},
			Err(e) => warn!(error = %e, "Identity provider unavailable, ignoring session"),
		}

		match self.handles.recall().await {
			Ok(Some(handle)) => keys.push(IdentityKey::Handle(handle)),
			Ok(None) => {},
			Err(e) => warn!(error = %e, "Handle store unavailable, ignoring remembered handle"),
		}

		keys
	}

	/// Persists the handle of a successful submission for later visits.
	pub async fn remember(&self, handle: &str) -> Result<(), IdentityError> {
		self.handles.remember(handle).await.map(|_| ())
	}

	/// Signs out and forgets the remembered handle.
	pub async fn sign_out(&self) -> Result<(), IdentityError> {
		self.provider.sign_out().await?;
		self.handles.clear().await
	}

	/// Changes of the authenticated identity.
	pub fn changes(&self) -> watch::Receiver<Option<AuthIdentity>> {
		self.provider.subscribe()
	}
}

/// Renders keys for logs without exposing full handles.
pub fn describe_keys(keys: &[IdentityKey]) -> String {
	keys.iter()
		.map(|key| format!("{}:{}", key.kind(), truncate_id(key.value())))
		.collect::<Vec<_>>()
		.join(",")
}
