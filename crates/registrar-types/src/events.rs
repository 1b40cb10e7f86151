//! Signals produced for the requester.
//!
//! The approval synchronizer converts repository observations into these
//! values; the consuming context renders them or navigates on them.

use serde::{Deserialize, Serialize};

use crate::{AccessGrant, OrderId, MSG_APPROVED, MSG_AWAITING_REVIEW, MSG_REJECTED, MSG_RETRY};

/// Client-visible transition observed by the synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum SyncSignal {
	/// The latest order is still pending.
	AwaitingReview {
		order_id: OrderId,
		/// Short-lived URL of the uploaded payment evidence, if any.
		#[serde(default, skip_serializing_if = "Option::is_none")]
		preview_url: Option<String>,
	},
	/// The latest order was approved. Terminal.
	Approved { order_id: OrderId, grant: AccessGrant },
	/// The latest order was rejected. Terminal.
	Rejected { order_id: OrderId },
	/// A poll failed; the synchronizer retries on the next tick.
	Degraded { reason: String },
}

impl SyncSignal {
	pub fn is_terminal(&self) -> bool {
		matches!(self, SyncSignal::Approved { .. } | SyncSignal::Rejected { .. })
	}

	/// Text shown to the requester for this signal.
	pub fn message(&self) -> &'static str {
		match self {
			SyncSignal::AwaitingReview { .. } => MSG_AWAITING_REVIEW,
			SyncSignal::Approved { .. } => MSG_APPROVED,
			SyncSignal::Rejected { .. } => MSG_REJECTED,
			SyncSignal::Degraded { .. } => MSG_RETRY,
		}
	}
}

/// Where a requester lands after sign-in or on start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum EntryRoute {
	/// Latest order is approved: go straight to the resources.
	Resources { grant: AccessGrant },
	/// No approved order: go to the registration form.
	Register,
}

impl EntryRoute {
	pub fn path(&self) -> String {
		match self {
			EntryRoute::Resources { grant } => grant.resource_path(),
			EntryRoute::Register => "/register".to_string(),
		}
	}
}
