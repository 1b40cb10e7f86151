//! Administrator operations on submitted orders.

use crate::state::{OrderStateMachine, StateError, TransitionOutcome};
use registrar_blob::{ArtifactAccessIssuer, BlobError, SignedUrl};
use registrar_orders::OrderRepository;
use registrar_types::{Order, OrderId, ReviewDecision, WorkflowError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum ReviewError {
	#[error(transparent)]
	State(#[from] StateError),
	#[error("Order {0} not found")]
	NotFound(OrderId),
	#[error("Order {0} has no payment artifact")]
	NoArtifact(OrderId),
	#[error("Artifact error: {0}")]
	Artifact(#[from] BlobError),
	#[error("Repository error: {0}")]
	Repository(String),
}

impl From<ReviewError> for WorkflowError {
	fn from(err: ReviewError) -> Self {
		match err {
			ReviewError::State(e) => e.into(),
			ReviewError::NotFound(id) => WorkflowError::NotFound(format!("order {}", id)),
			ReviewError::NoArtifact(id) => {
				WorkflowError::NotFound(format!("artifact of order {}", id))
			},
			ReviewError::Artifact(e) => e.into(),
			ReviewError::Repository(e) => WorkflowError::StoreUnavailable(e),
		}
	}
}

/// Operations behind the admin dashboard.
///
/// Every call is a single attempt; failures go straight back to the caller.
pub struct AdminReviewer {
	state_machine: Arc<OrderStateMachine>,
	repository: Arc<dyn OrderRepository>,
	issuer: Arc<ArtifactAccessIssuer>,
	artifact_ttl: Duration,
}

impl AdminReviewer {
	pub fn new(
		state_machine: Arc<OrderStateMachine>,
		repository: Arc<dyn OrderRepository>,
		issuer: Arc<ArtifactAccessIssuer>,
		artifact_ttl: Duration,
	) -> Self {
		Self {
			state_machine,
			repository,
			issuer,
			artifact_ttl,
		}
	}

	/// Approves or rejects a pending order.
	#[instrument(skip_all, fields(order_id = id, decision = %decision))]
	pub async fn review(
		&self,
		id: OrderId,
		decision: ReviewDecision,
	) -> Result<TransitionOutcome, ReviewError> {
		let outcome = self.state_machine.transition(id, decision).await?;
		info!(changed = outcome.changed(), "Review recorded");
		Ok(outcome)
	}

	/// All orders, most recent first.
	pub async fn list_orders(&self) -> Result<Vec<Order>, ReviewError> {
		self.repository
			.list()
			.await
			.map_err(|e| ReviewError::Repository(e.to_string()))
	}

	async fn artifact_path(&self, id: OrderId) -> Result<String, ReviewError> {
		let order = self
			.repository
			.get_by_id(id)
			.await
			.map_err(|e| ReviewError::Repository(e.to_string()))?
			.ok_or(ReviewError::NotFound(id))?;
		order.artifact_path.ok_or(ReviewError::NoArtifact(id))
	}

	/// Signed URL of the payment evidence attached to an order.
	pub async fn artifact_url(&self, id: OrderId) -> Result<SignedUrl, ReviewError> {
		let path = self.artifact_path(id).await?;
		Ok(self.issuer.issue_read_url(&path, self.artifact_ttl).await?)
	}

	/// Invalidates every URL issued so far for an order's payment evidence.
	#[instrument(skip(self), fields(order_id = id))]
	pub async fn revoke_artifact(&self, id: OrderId) -> Result<(), ReviewError> {
		let path = self.artifact_path(id).await?;
		self.issuer.revoke(&path);
		info!("Artifact URLs revoked");
		Ok(())
	}
}
