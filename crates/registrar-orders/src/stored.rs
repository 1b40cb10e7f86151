//! Order repository over the key/value [`StorageService`].
//!
//! Layout:
//! - `orders:{id}` holds the order row,
//! - `order_sequence:next` holds the next id to assign,
//! - `order_index:all` lists every id,
//! - `orders_by_handle:{hex}` and `orders_by_auth:{hex}` list the ids per
//!   identity key, hex-encoded so free text never reaches a storage key.
//!
//! Writes are serialized through one async mutex; each status change touches
//! exactly one row. An insert writes its index entries first and the row
//! last, so the row is the commit point: readers skip index entries whose
//! row was never written.

use crate::{OrderError, OrderRepository};
use async_trait::async_trait;
use registrar_storage::{StorageError, StorageService};
use registrar_types::{
	current_timestamp, truncate_id, IdentityKey, NewOrder, Order, OrderId, OrderStatus,
	StorageKey,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

fn storage_err(e: StorageError) -> OrderError {
	OrderError::Storage(e.to_string())
}

fn index_slot(key: &IdentityKey) -> (&'static str, String) {
	let namespace = match key {
		IdentityKey::Handle(_) => StorageKey::OrdersByHandle,
		IdentityKey::Auth(_) => StorageKey::OrdersByAuth,
	};
	(namespace.as_str(), hex::encode(key.value()))
}

pub struct StoredOrderRepository {
	storage: Arc<StorageService>,
	write_lock: Mutex<()>,
}

impl StoredOrderRepository {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	async fn load_ids(&self, namespace: &str, id: &str) -> Result<Vec<OrderId>, OrderError> {
		Ok(self
			.storage
			.retrieve_optional(namespace, id)
			.await
			.map_err(storage_err)?
			.unwrap_or_default())
	}

	async fn append_id(&self, namespace: &str, id: &str, order_id: OrderId) -> Result<(), OrderError> {
		let mut ids = self.load_ids(namespace, id).await?;
		ids.push(order_id);
		self.storage.store(namespace, id, &ids).await.map_err(storage_err)
	}

	async fn next_id(&self) -> Result<OrderId, OrderError> {
		let namespace = StorageKey::OrderSequence.as_str();
		let next: OrderId = self
			.storage
			.retrieve_optional(namespace, "next")
			.await
			.map_err(storage_err)?
			.unwrap_or(1);
		self.storage
			.store(namespace, "next", &(next + 1))
			.await
			.map_err(storage_err)?;
		Ok(next)
	}

	async fn load(&self, id: OrderId) -> Result<Order, OrderError> {
		self.get_by_id(id).await?.ok_or(OrderError::NotFound(id))
	}

	async fn write_status(&self, mut order: Order, status: OrderStatus) -> Result<Order, OrderError> {
		order.status = status;
		order.updated_at = current_timestamp();
		self.storage
			.update(StorageKey::Orders.as_str(), &order.id.to_string(), &order)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => OrderError::NotFound(order.id),
				e => storage_err(e),
			})?;
		Ok(order)
	}
}

#[async_trait]
impl OrderRepository for StoredOrderRepository {
	#[instrument(skip_all, fields(handle = %truncate_id(&order.requester_handle)))]
	async fn insert(&self, order: NewOrder) -> Result<OrderId, OrderError> {
		let _guard = self.write_lock.lock().await;

		let id = self.next_id().await?;
		let order = order.into_order(id, current_timestamp());

		for key in order.identity_keys() {
			let (namespace, slot) = index_slot(&key);
			self.append_id(namespace, &slot, id).await?;
		}
		self.append_id(StorageKey::OrderIndex.as_str(), "all", id).await?;

		self.storage
			.store(StorageKey::Orders.as_str(), &id.to_string(), &order)
			.await
			.map_err(storage_err)?;

		debug!(order_id = id, "Stored order");
		Ok(id)
	}

	async fn find_latest_by_identity(
		&self,
		key: &IdentityKey,
	) -> Result<Option<Order>, OrderError> {
		let (namespace, slot) = index_slot(key);
		let mut ids = self.load_ids(namespace, &slot).await?;
		ids.sort_unstable_by(|a, b| b.cmp(a));

		for id in ids {
			match self.get_by_id(id).await? {
				Some(order) if order.matches(key) => return Ok(Some(order)),
				Some(_) => debug!(order_id = id, "Index entry points at another requester"),
				None => debug!(order_id = id, "Skipping uncommitted order"),
			}
		}
		Ok(None)
	}

	async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
		self.storage
			.retrieve_optional(StorageKey::Orders.as_str(), &id.to_string())
			.await
			.map_err(storage_err)
	}

	#[instrument(skip(self), fields(order_id = id))]
	async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, OrderError> {
		let _guard = self.write_lock.lock().await;
		let order = self.load(id).await?;
		self.write_status(order, status).await
	}

	#[instrument(skip(self), fields(order_id = id))]
	async fn compare_and_set_status(
		&self,
		id: OrderId,
		expected: OrderStatus,
		status: OrderStatus,
	) -> Result<Order, OrderError> {
		let _guard = self.write_lock.lock().await;
		let order = self.load(id).await?;
		if order.status != expected {
			return Err(OrderError::Conflict {
				id,
				expected,
				actual: order.status,
				requested: status,
			});
		}
		self.write_status(order, status).await
	}

	async fn list(&self) -> Result<Vec<Order>, OrderError> {
		let mut ids = self.load_ids(StorageKey::OrderIndex.as_str(), "all").await?;
		ids.sort_unstable_by(|a, b| b.cmp(a));

		let mut orders = Vec::with_capacity(ids.len());
		for id in ids {
			if let Some(order) = self.get_by_id(id).await? {
				orders.push(order);
			}
		}
		Ok(orders)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_storage::implementations::memory::MemoryStorage;
	use registrar_storage::StorageInterface;
	use std::time::Duration;

	fn repository() -> StoredOrderRepository {
		StoredOrderRepository::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	fn new_order(handle: &str, auth: Option<&str>) -> NewOrder {
		NewOrder {
			university_id: 3,
			department_id: 7,
			full_name: "Test Person".into(),
			requester_handle: handle.into(),
			auth_identity: auth.map(str::to_string),
			artifact_path: Some(format!("screenshot/{}-1.png", handle)),
		}
	}

	#[tokio::test]
	async fn test_orders_start_pending_with_increasing_ids() {
		let repo = repository();
		let first = repo.insert(new_order("alice", None)).await.unwrap();
		let second = repo.insert(new_order("bob", None)).await.unwrap();
		assert!(second > first);

		let order = repo.get_by_id(first).await.unwrap().unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.requester_handle, "alice");
		assert!(repo.get_by_id(99).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_latest_by_identity_returns_highest_id() {
		let repo = repository();
		let older = repo.insert(new_order("alice", None)).await.unwrap();
		repo.insert(new_order("carol", None)).await.unwrap();
		let newer = repo.insert(new_order("alice", Some("u-1"))).await.unwrap();
		repo.update_status(older, OrderStatus::Approved).await.unwrap();

		let latest = repo
			.find_latest_by_identity(&IdentityKey::Handle("alice".into()))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(latest.id, newer);
		assert_eq!(latest.status, OrderStatus::Pending);

		let by_auth = repo
			.find_latest_by_identity(&IdentityKey::Auth("u-1".into()))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(by_auth.id, newer);

		assert!(repo
			.find_latest_by_identity(&IdentityKey::Handle("nobody".into()))
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_handle_and_auth_indexes_are_separate() {
		let repo = repository();
		repo.insert(new_order("u-1", None)).await.unwrap();
		assert!(repo
			.find_latest_by_identity(&IdentityKey::Auth("u-1".into()))
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_approving_one_order_leaves_others_untouched() {
		let repo = repository();
		let a = repo.insert(new_order("alice", None)).await.unwrap();
		let b = repo.insert(new_order("bob", None)).await.unwrap();

		repo.compare_and_set_status(a, OrderStatus::Pending, OrderStatus::Approved)
			.await
			.unwrap();

		assert_eq!(
			repo.get_by_id(a).await.unwrap().unwrap().status,
			OrderStatus::Approved
		);
		assert_eq!(
			repo.get_by_id(b).await.unwrap().unwrap().status,
			OrderStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_compare_and_set_conflict_preserves_status() {
		let repo = repository();
		let id = repo.insert(new_order("bob", None)).await.unwrap();
		repo.compare_and_set_status(id, OrderStatus::Pending, OrderStatus::Rejected)
			.await
			.unwrap();

		let err = repo
			.compare_and_set_status(id, OrderStatus::Pending, OrderStatus::Approved)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			OrderError::Conflict {
				actual: OrderStatus::Rejected,
				..
			}
		));
		assert_eq!(
			repo.get_by_id(id).await.unwrap().unwrap().status,
			OrderStatus::Rejected
		);
	}

	#[tokio::test]
	async fn test_update_missing_order_is_not_found() {
		let repo = repository();
		assert!(matches!(
			repo.update_status(5, OrderStatus::Approved).await,
			Err(OrderError::NotFound(5))
		));
	}

	#[tokio::test]
	async fn test_list_is_most_recent_first() {
		let repo = repository();
		for handle in ["a", "b", "c"] {
			repo.insert(new_order(handle, None)).await.unwrap();
		}
		let handles: Vec<String> = repo
			.list()
			.await
			.unwrap()
			.into_iter()
			.map(|o| o.requester_handle)
			.collect();
		assert_eq!(handles, vec!["c", "b", "a"]);
	}

	struct UnavailableStorage;

	#[async_trait]
	impl StorageInterface for UnavailableStorage {
		async fn get_bytes(&self, _key: &str) -> Result<Vec<u8>, StorageError> {
			Err(StorageError::Backend("connection refused".into()))
		}

		async fn set_bytes(
			&self,
			_key: &str,
			_value: Vec<u8>,
			_ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			Err(StorageError::Backend("connection refused".into()))
		}

		async fn delete(&self, _key: &str) -> Result<(), StorageError> {
			Err(StorageError::Backend("connection refused".into()))
		}

		async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
			Err(StorageError::Backend("connection refused".into()))
		}

		fn config_schema(&self) -> Box<dyn registrar_types::ConfigSchema> {
			unimplemented!()
		}
	}

	#[tokio::test]
	async fn test_transport_failure_is_distinct_from_not_found() {
		let repo =
			StoredOrderRepository::new(Arc::new(StorageService::new(Box::new(UnavailableStorage))));
		assert!(matches!(
			repo.get_by_id(1).await,
			Err(OrderError::Storage(_))
		));
		assert!(matches!(
			repo.find_latest_by_identity(&IdentityKey::Handle("alice".into()))
				.await,
			Err(OrderError::Storage(_))
		));
		assert!(matches!(
			repo.insert(new_order("alice", None)).await,
			Err(OrderError::Storage(_))
		));
	}

	/// Memory storage whose writes fail for keys under `failing_prefix`.
	struct PartialOutage {
		inner: MemoryStorage,
		failing_prefix: &'static str,
	}

	#[async_trait]
	impl StorageInterface for PartialOutage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(
			&self,
			key: &str,
			value: Vec<u8>,
			ttl: Option<Duration>,
		) -> Result<(), StorageError> {
			if key.starts_with(self.failing_prefix) {
				return Err(StorageError::Backend("write timed out".into()));
			}
			self.inner.set_bytes(key, value, ttl).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		fn config_schema(&self) -> Box<dyn registrar_types::ConfigSchema> {
			self.inner.config_schema()
		}
	}

	fn repository_failing_on(prefix: &'static str) -> StoredOrderRepository {
		StoredOrderRepository::new(Arc::new(StorageService::new(Box::new(PartialOutage {
			inner: MemoryStorage::new(),
			failing_prefix: prefix,
		}))))
	}

	#[tokio::test]
	async fn test_failed_index_write_leaves_no_visible_order() {
		let repo = repository_failing_on("order_index:");
		assert!(matches!(
			repo.insert(new_order("alice", None)).await,
			Err(OrderError::Storage(_))
		));

		assert!(repo.get_by_id(1).await.unwrap().is_none());
		assert!(repo
			.find_latest_by_identity(&IdentityKey::Handle("alice".into()))
			.await
			.unwrap()
			.is_none());
		assert!(repo.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_failed_row_write_is_skipped_by_readers() {
		let repo = repository_failing_on("orders:");
		assert!(matches!(
			repo.insert(new_order("alice", Some("u-1"))).await,
			Err(OrderError::Storage(_))
		));

		// Both indexes now name an id whose row was never written.
		assert!(repo
			.find_latest_by_identity(&IdentityKey::Handle("alice".into()))
			.await
			.unwrap()
			.is_none());
		assert!(repo
			.find_latest_by_identity(&IdentityKey::Auth("u-1".into()))
			.await
			.unwrap()
			.is_none());
		assert!(repo.list().await.unwrap().is_empty());
	}
}
