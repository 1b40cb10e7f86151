use crate::IdentityError;
use registrar_storage::StorageService;
use registrar_types::{current_timestamp, truncate_id, RememberedHandle, StorageKey};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SLOT: &str = "current";

/// Single-slot store for the requester handle remembered after a
/// submission.
///
/// A remembered handle expires after `lifetime_secs` (zero keeps it until
/// [`clear`](Self::clear)) and is dropped on sign-out.
pub struct HandleStore {
	storage: Arc<StorageService>,
	lifetime_secs: u64,
}

impl HandleStore {
	pub fn new(storage: Arc<StorageService>, lifetime_secs: u64) -> Self {
		Self {
			storage,
			lifetime_secs,
		}
	}

	pub async fn remember(&self, handle: &str) -> Result<RememberedHandle, IdentityError> {
		let remembered = RememberedHandle {
			handle: handle.to_string(),
			remembered_at: current_timestamp(),
		};
		let ttl = (self.lifetime_secs > 0).then(|| Duration::from_secs(self.lifetime_secs));
		self.storage
			.store_with_ttl(StorageKey::RememberedHandle.as_str(), SLOT, &remembered, ttl)
			.await
			.map_err(|e| IdentityError::Storage(e.to_string()))?;

		debug!(handle = %truncate_id(handle), "Remembered requester handle");
		Ok(remembered)
	}

	pub async fn recall(&self) -> Result<Option<String>, IdentityError> {
		self.recall_at(current_timestamp()).await
	}

	/// Returns the remembered handle unless it has expired by `now`.
	pub async fn recall_at(&self, now: u64) -> Result<Option<String>, IdentityError> {
		let remembered: Option<RememberedHandle> = self
			.storage
			.retrieve_optional(StorageKey::RememberedHandle.as_str(), SLOT)
			.await
			.map_err(|e| IdentityError::Storage(e.to_string()))?;

		match remembered {
			Some(r) if r.is_expired(now, self.lifetime_secs) => {
				self.clear().await?;
				Ok(None)
			},
			Some(r) => Ok(Some(r.handle)),
			None => Ok(None),
		}
	}

	pub async fn clear(&self) -> Result<(), IdentityError> {
		self.storage
			.remove(StorageKey::RememberedHandle.as_str(), SLOT)
			.await
			.map_err(|e| IdentityError::Storage(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_storage::implementations::memory::MemoryStorage;

	fn store(lifetime_secs: u64) -> HandleStore {
		HandleStore::new(
			Arc::new(StorageService::new(Box::new(MemoryStorage::new()))),
			lifetime_secs,
		)
	}

	#[tokio::test]
	async fn test_remember_recall_clear() {
		let handles = store(0);
		assert_eq!(handles.recall().await.unwrap(), None);

		handles.remember("alice").await.unwrap();
		assert_eq!(handles.recall().await.unwrap().as_deref(), Some("alice"));

		handles.remember("alice_2").await.unwrap();
		assert_eq!(handles.recall().await.unwrap().as_deref(), Some("alice_2"));

		handles.clear().await.unwrap();
		assert_eq!(handles.recall().await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_handle_expires_after_lifetime() {
		let handles = store(60);
		let remembered = handles.remember("alice").await.unwrap();

		assert_eq!(
			handles
				.recall_at(remembered.remembered_at + 59)
				.await
				.unwrap()
				.as_deref(),
			Some("alice")
		);
		assert_eq!(
			handles.recall_at(remembered.remembered_at + 60).await.unwrap(),
			None
		);
		// Expired entries are removed on read.
		assert_eq!(handles.recall_at(remembered.remembered_at).await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_zero_lifetime_never_expires() {
		let handles = store(0);
		let remembered = handles.remember("bob").await.unwrap();
		assert_eq!(
			handles
				.recall_at(remembered.remembered_at + 10 * 365 * 86_400)
				.await
				.unwrap()
				.as_deref(),
			Some("bob")
		);
	}
}
