//! Order state machine implementation.
//!
//! Orders are created `pending` and leave that state at most once, through an
//! administrator decision, to either `approved` or `rejected`. Both are
//! terminal. Status writes go through a compare-and-set on the expected
//! current status so that a late second decision cannot overwrite the first.

use once_cell::sync::Lazy;
use registrar_orders::{OrderError, OrderRepository};
use registrar_types::{Order, OrderId, OrderStatus, ReviewDecision, WorkflowError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum StateError {
	#[error("Order {0} not found")]
	NotFound(OrderId),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Repository error: {0}")]
	Repository(String),
}

impl From<StateError> for WorkflowError {
	fn from(err: StateError) -> Self {
		match err {
			StateError::NotFound(id) => WorkflowError::NotFound(format!("order {}", id)),
			StateError::InvalidTransition { from, to } => {
				WorkflowError::InvalidTransition { from, to }
			},
			StateError::Repository(e) => WorkflowError::StoreUnavailable(e),
		}
	}
}

/// Result of a successful transition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
	/// The status was written.
	Applied(Order),
	/// The order already had the requested status. Nothing was written.
	Unchanged(Order),
}

impl TransitionOutcome {
	pub fn order(&self) -> &Order {
		match self {
			TransitionOutcome::Applied(order) | TransitionOutcome::Unchanged(order) => order,
		}
	}

	pub fn into_order(self) -> Order {
		match self {
			TransitionOutcome::Applied(order) | TransitionOutcome::Unchanged(order) => order,
		}
	}

	pub fn changed(&self) -> bool {
		matches!(self, TransitionOutcome::Applied(_))
	}
}

// Static transition table - each state maps to allowed next states
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	HashMap::from([
		(
			OrderStatus::Pending,
			HashSet::from([OrderStatus::Approved, OrderStatus::Rejected]),
		),
		(OrderStatus::Approved, HashSet::new()), // terminal
		(OrderStatus::Rejected, HashSet::new()), // terminal
	])
});

/// Applies administrator decisions to stored orders.
pub struct OrderStateMachine {
	repository: Arc<dyn OrderRepository>,
}

impl OrderStateMachine {
	pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
		Self { repository }
	}

	/// Checks if a state transition is valid
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS
			.get(&from)
			.is_some_and(|allowed| allowed.contains(&to))
	}

	/// Moves a pending order to the status implied by `decision`.
	///
	/// Repeating the decision that already took effect is reported as
	/// [`TransitionOutcome::Unchanged`]; the opposite decision on a terminal
	/// order fails with [`StateError::InvalidTransition`] and leaves the order
	/// untouched.
	#[instrument(skip_all, fields(order_id = id, decision = %decision))]
	pub async fn transition(
		&self,
		id: OrderId,
		decision: ReviewDecision,
	) -> Result<TransitionOutcome, StateError> {
		let target = decision.target_status();
		let expected = OrderStatus::Pending;
		debug_assert!(Self::is_valid_transition(expected, target));

		match self
			.repository
			.compare_and_set_status(id, expected, target)
			.await
		{
			Ok(order) => {
				info!(status = %order.status, "Order status changed");
				Ok(TransitionOutcome::Applied(order))
			},
			Err(OrderError::Conflict { actual, .. }) if actual == target => {
				let order = self
					.repository
					.get_by_id(id)
					.await
					.map_err(|e| StateError::Repository(e.to_string()))?
					.ok_or(StateError::NotFound(id))?;
				debug!(status = %actual, "Order already has the requested status");
				Ok(TransitionOutcome::Unchanged(order))
			},
			Err(OrderError::Conflict { actual, .. }) => Err(StateError::InvalidTransition {
				from: actual,
				to: target,
			}),
			Err(OrderError::NotFound(id)) => Err(StateError::NotFound(id)),
			Err(OrderError::Storage(e)) => Err(StateError::Repository(e)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_orders::{MockOrderRepository, StoredOrderRepository};
	use registrar_storage::implementations::memory::MemoryStorage;
	use registrar_storage::StorageService;
	use registrar_types::NewOrder;

	fn new_order(handle: &str) -> NewOrder {
		NewOrder {
			university_id: 3,
			department_id: 7,
			full_name: "Test Requester".into(),
			requester_handle: handle.into(),
			auth_identity: None,
			artifact_path: None,
		}
	}

	fn stored() -> Arc<StoredOrderRepository> {
		Arc::new(StoredOrderRepository::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))))
	}

	#[test]
	fn test_transition_table() {
		use OrderStatus::*;
		assert!(OrderStateMachine::is_valid_transition(Pending, Approved));
		assert!(OrderStateMachine::is_valid_transition(Pending, Rejected));
		for terminal in [Approved, Rejected] {
			for to in [Pending, Approved, Rejected] {
				assert!(!OrderStateMachine::is_valid_transition(terminal, to));
			}
		}
	}

	#[tokio::test]
	async fn test_approve_pending_order() {
		let repository = stored();
		let id = repository.insert(new_order("alice")).await.unwrap();
		let machine = OrderStateMachine::new(repository.clone());

		let outcome = machine.transition(id, ReviewDecision::Approve).await.unwrap();
		assert!(outcome.changed());
		assert_eq!(outcome.order().status, OrderStatus::Approved);
		assert_eq!(
			repository.get_by_id(id).await.unwrap().unwrap().status,
			OrderStatus::Approved
		);
	}

	#[tokio::test]
	async fn test_status_changes_at_most_once() {
		let repository = stored();
		let id = repository.insert(new_order("alice")).await.unwrap();
		let machine = OrderStateMachine::new(repository.clone());

		machine.transition(id, ReviewDecision::Approve).await.unwrap();
		let err = machine
			.transition(id, ReviewDecision::Reject)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			StateError::InvalidTransition {
				from: OrderStatus::Approved,
				to: OrderStatus::Rejected
			}
		));
		assert_eq!(
			repository.get_by_id(id).await.unwrap().unwrap().status,
			OrderStatus::Approved
		);
	}

	#[tokio::test]
	async fn test_double_reject_is_idempotent() {
		let repository = stored();
		let id = repository.insert(new_order("bob")).await.unwrap();
		let machine = OrderStateMachine::new(repository.clone());

		let first = machine.transition(id, ReviewDecision::Reject).await.unwrap();
		let second = machine.transition(id, ReviewDecision::Reject).await.unwrap();

		assert!(first.changed());
		assert!(!second.changed());
		assert_eq!(second.order().status, OrderStatus::Rejected);
		assert_eq!(second.order().updated_at, first.order().updated_at);
	}

	#[tokio::test]
	async fn test_repeated_decision_does_not_write() {
		let mut repository = MockOrderRepository::new();
		let mut rejected = new_order("bob").into_order(4, 100);
		rejected.status = OrderStatus::Rejected;

		repository
			.expect_compare_and_set_status()
			.times(1)
			.returning(|id, expected, requested| {
				Err(OrderError::Conflict {
					id,
					expected,
					actual: OrderStatus::Rejected,
					requested,
				})
			});
		let found = rejected.clone();
		repository
			.expect_get_by_id()
			.times(1)
			.returning(move |_| Ok(Some(found.clone())));
		repository.expect_update_status().never();

		let machine = OrderStateMachine::new(Arc::new(repository));
		let outcome = machine.transition(4, ReviewDecision::Reject).await.unwrap();
		assert_eq!(outcome, TransitionOutcome::Unchanged(rejected));
	}

	#[tokio::test]
	async fn test_approving_one_order_leaves_others_alone() {
		let repository = stored();
		let a = repository.insert(new_order("alice")).await.unwrap();
		let b = repository.insert(new_order("bob")).await.unwrap();
		let machine = OrderStateMachine::new(repository.clone());

		machine.transition(a, ReviewDecision::Approve).await.unwrap();
		assert_eq!(
			repository.get_by_id(b).await.unwrap().unwrap().status,
			OrderStatus::Pending
		);
	}

	#[tokio::test]
	async fn test_missing_order_and_store_failure() {
		let machine = OrderStateMachine::new(stored());
		assert!(matches!(
			machine.transition(99, ReviewDecision::Approve).await,
			Err(StateError::NotFound(99))
		));

		let mut repository = MockOrderRepository::new();
		repository
			.expect_compare_and_set_status()
			.returning(|_, _, _| Err(OrderError::Storage("connection reset".into())));
		let machine = OrderStateMachine::new(Arc::new(repository));
		let err = machine
			.transition(1, ReviewDecision::Approve)
			.await
			.unwrap_err();
		assert!(WorkflowError::from(err).is_retryable());
	}
}
