//! Workflow error taxonomy.
//!
//! Component crates define their own error enums; each of them maps onto one
//! of these four kinds so callers can decide how to present a failure without
//! knowing which backend produced it.

use thiserror::Error;

use crate::OrderStatus;

/// User-facing message while an order awaits review.
pub const MSG_AWAITING_REVIEW: &str = "Waiting for admin approval...";
/// User-facing message once an order is approved.
pub const MSG_APPROVED: &str = "Registration approved. You can now access your resources.";
/// User-facing message once an order is rejected.
pub const MSG_REJECTED: &str = "Registration rejected. Please contact support.";
/// Generic prompt for every other failure.
pub const MSG_RETRY: &str = "Something went wrong. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
	/// Required input missing or malformed; nothing was persisted.
	#[error("Validation failed: {0}")]
	Validation(String),
	/// Transient failure of an external store; state is unchanged.
	#[error("Store unavailable: {0}")]
	StoreUnavailable(String),
	/// Nothing exists yet for the given key or path.
	#[error("Not found: {0}")]
	NotFound(String),
	/// Attempt to move an order out of a terminal status.
	#[error("Invalid transition from {from} to {to}: order is terminal")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl WorkflowError {
	/// Whether the caller may simply try again.
	pub fn is_retryable(&self) -> bool {
		matches!(self, WorkflowError::StoreUnavailable(_))
	}

	/// Message shown to the requester or administrator.
	pub fn user_message(&self) -> String {
		match self {
			WorkflowError::Validation(detail) => format!("Please fix the form: {}", detail),
			WorkflowError::InvalidTransition { from, .. } => {
				format!("This order was already {} and cannot be changed.", from)
			},
			_ => MSG_RETRY.to_string(),
		}
	}
}
