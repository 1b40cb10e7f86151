use async_trait::async_trait;
use registrar_blob::ArtifactAccessIssuer;
use registrar_orders::OrderRepository;
use registrar_types::{IdentityKey, OrderStatus, OrderView, WorkflowError};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Point-in-time read of the latest order for one identity key.
///
/// `Ok(None)` means nothing has been submitted under the key yet. Transport
/// failures are errors, never `None`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderSource: Send + Sync {
	async fn latest_for(&self, key: &IdentityKey) -> Result<Option<OrderView>, WorkflowError>;
}

/// Reads straight from the order repository, attaching an evidence preview
/// while the order is pending.
pub struct RepositoryOrderSource {
	repository: Arc<dyn OrderRepository>,
	previews: Option<(Arc<ArtifactAccessIssuer>, Duration)>,
}

impl RepositoryOrderSource {
	pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
		Self {
			repository,
			previews: None,
		}
	}

	pub fn with_previews(mut self, issuer: Arc<ArtifactAccessIssuer>, ttl: Duration) -> Self {
		self.previews = Some((issuer, ttl));
		self
	}
}

#[async_trait]
impl OrderSource for RepositoryOrderSource {
	async fn latest_for(&self, key: &IdentityKey) -> Result<Option<OrderView>, WorkflowError> {
		let Some(order) = self.repository.find_latest_by_identity(key).await? else {
			return Ok(None);
		};

		let preview_url = match (&order.status, &order.artifact_path, &self.previews) {
			(OrderStatus::Pending, Some(path), Some((issuer, ttl))) => {
				match issuer.issue_read_url(path, *ttl).await {
					Ok(signed) => Some(signed.url),
					// Display-only; the order itself is still reported.
					Err(e) => {
						warn!(order_id = order.id, error = %e, "Preview unavailable");
						None
					},
				}
			},
			_ => None,
		};

		Ok(Some(OrderView { order, preview_url }))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_blob::implementations::memory::MemoryBlobStore;
	use registrar_blob::{BlobService, UrlSigner};
	use registrar_orders::{MockOrderRepository, OrderError, StoredOrderRepository};
	use registrar_storage::implementations::memory::MemoryStorage;
	use registrar_storage::StorageService;
	use registrar_types::{NewOrder, SecretString};
	use url::Url;

	#[tokio::test]
	async fn test_preview_only_while_pending() {
		let repository = Arc::new(StoredOrderRepository::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))));
		let issuer = Arc::new(ArtifactAccessIssuer::new(
			Arc::new(BlobService::new(Box::new(MemoryBlobStore::new()), "payment")),
			UrlSigner::new(
				SecretString::from("secret"),
				"payment",
				Url::parse("http://localhost:3000").unwrap(),
				Duration::ZERO,
			),
			Duration::from_secs(3600),
		));
		issuer
			.blobs()
			.upload("screenshot/alice-1.png", vec![1, 2, 3])
			.await
			.unwrap();
		let id = repository
			.insert(NewOrder {
				university_id: 3,
				department_id: 7,
				full_name: "Alice".into(),
				requester_handle: "alice".into(),
				auth_identity: None,
				artifact_path: Some("screenshot/alice-1.png".into()),
			})
			.await
			.unwrap();
		let source = RepositoryOrderSource::new(repository.clone())
			.with_previews(issuer, Duration::from_secs(60));
		let key = IdentityKey::Handle("alice".into());

		let view = source.latest_for(&key).await.unwrap().unwrap();
		assert_eq!(view.order.id, id);
		assert!(view.preview_url.is_some());

		repository
			.update_status(id, OrderStatus::Approved)
			.await
			.unwrap();
		let view = source.latest_for(&key).await.unwrap().unwrap();
		assert_eq!(view.preview_url, None);

		assert_eq!(
			source
				.latest_for(&IdentityKey::Handle("nobody".into()))
				.await
				.unwrap(),
			None
		);
	}

	#[tokio::test]
	async fn test_store_failure_is_not_none() {
		let mut repository = MockOrderRepository::new();
		repository
			.expect_find_latest_by_identity()
			.returning(|_| Err(OrderError::Storage("unreachable".into())));
		let source = RepositoryOrderSource::new(Arc::new(repository));

		let err = source
			.latest_for(&IdentityKey::Handle("alice".into()))
			.await
			.unwrap_err();
		assert!(err.is_retryable());
	}
}
