//! Order repository.
//!
//! The repository is the only owner of persisted orders. It exposes the
//! narrow set of reads and writes the workflow needs and reports transport
//! failures separately from "nothing found".

use async_trait::async_trait;
use registrar_types::{IdentityKey, NewOrder, Order, OrderId, OrderStatus, WorkflowError};
use thiserror::Error;

mod stored;

pub use stored::StoredOrderRepository;

#[derive(Debug, Error)]
pub enum OrderError {
	#[error("Order {0} not found")]
	NotFound(OrderId),
	/// The order's status was not the expected one at write time.
	#[error("Order {id} is {actual}, expected {expected}")]
	Conflict {
		id: OrderId,
		expected: OrderStatus,
		actual: OrderStatus,
		requested: OrderStatus,
	},
	/// The backing store failed; nothing was changed.
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderError> for WorkflowError {
	fn from(err: OrderError) -> Self {
		match err {
			OrderError::NotFound(id) => WorkflowError::NotFound(format!("order {}", id)),
			OrderError::Conflict {
				actual, requested, ..
			} => WorkflowError::InvalidTransition {
				from: actual,
				to: requested,
			},
			OrderError::Storage(e) => WorkflowError::StoreUnavailable(e),
		}
	}
}

/// Access to stored orders.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait OrderRepository: Send + Sync {
	/// Stores a new pending order and returns its id. Ids are strictly
	/// increasing.
	async fn insert(&self, order: NewOrder) -> Result<OrderId, OrderError>;

	/// The order with the highest id among those matching `key`.
	async fn find_latest_by_identity(&self, key: &IdentityKey)
		-> Result<Option<Order>, OrderError>;

	async fn get_by_id(&self, id: OrderId) -> Result<Option<Order>, OrderError>;

	/// Unconditionally sets the status of one order.
	async fn update_status(&self, id: OrderId, status: OrderStatus) -> Result<Order, OrderError>;

	/// Sets the status only if the order currently has `expected`.
	///
	/// Fails with [`OrderError::Conflict`] otherwise, leaving the order as is.
	async fn compare_and_set_status(
		&self,
		id: OrderId,
		expected: OrderStatus,
		status: OrderStatus,
	) -> Result<Order, OrderError>;

	/// Every stored order, most recent first.
	async fn list(&self) -> Result<Vec<Order>, OrderError>;
}
