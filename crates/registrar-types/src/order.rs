//! Registration order types.
//!
//! An order is one paid-registration request. It is created `pending`, leaves
//! that state at most once through an administrator decision and is never
//! deleted. The entitlement derived from an approved order is an
//! [`AccessGrant`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::IdentityKey;

/// Identifier assigned by the order repository. Strictly increasing, so a
/// larger id always denotes a more recent submission.
pub type OrderId = u64;

/// A stored registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
	/// Repository-assigned identifier.
	pub id: OrderId,
	/// University the requester registered for.
	pub university_id: u64,
	/// Department the requester registered for.
	pub department_id: u64,
	/// Free-text full name.
	pub full_name: String,
	/// Self-declared handle (e.g. a messaging-app username). Not unique.
	pub requester_handle: String,
	/// Identity provider id, present only if the requester was signed in at
	/// submission time.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_identity: Option<String>,
	/// Blob store key of the payment evidence, if one was attached.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifact_path: Option<String>,
	/// Review status.
	pub status: OrderStatus,
	/// Unix timestamp of the submission.
	pub created_at: u64,
	/// Unix timestamp of the last status change.
	pub updated_at: u64,
}

impl Order {
	/// Returns true if this order is addressable by the given identity key.
	pub fn matches(&self, key: &IdentityKey) -> bool {
		match key {
			IdentityKey::Handle(handle) => &self.requester_handle == handle,
			IdentityKey::Auth(id) => self.auth_identity.as_deref() == Some(id.as_str()),
		}
	}

	/// Derives the requester's entitlement. Only approved orders grant access.
	pub fn access_grant(&self) -> Option<AccessGrant> {
		match self.status {
			OrderStatus::Approved => Some(AccessGrant {
				university_id: self.university_id,
				department_id: self.department_id,
			}),
			_ => None,
		}
	}

	/// Identity keys under which this order is indexed.
	pub fn identity_keys(&self) -> Vec<IdentityKey> {
		let mut keys = vec![IdentityKey::Handle(self.requester_handle.clone())];
		if let Some(auth) = &self.auth_identity {
			keys.push(IdentityKey::Auth(auth.clone()));
		}
		keys
	}
}

/// Fields of an order before the repository assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
	pub university_id: u64,
	pub department_id: u64,
	pub full_name: String,
	pub requester_handle: String,
	pub auth_identity: Option<String>,
	pub artifact_path: Option<String>,
}

impl NewOrder {
	/// Materializes the stored row. Every order starts out pending.
	pub fn into_order(self, id: OrderId, now: u64) -> Order {
		Order {
			id,
			university_id: self.university_id,
			department_id: self.department_id,
			full_name: self.full_name,
			requester_handle: self.requester_handle,
			auth_identity: self.auth_identity,
			artifact_path: self.artifact_path,
			status: OrderStatus::Pending,
			created_at: now,
			updated_at: now,
		}
	}
}

/// Review status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Awaiting an administrator decision.
	Pending,
	/// Approved; the access grant is derivable.
	Approved,
	/// Rejected; the requester is told to contact support.
	Rejected,
}

impl OrderStatus {
	/// Terminal statuses accept no further transitions.
	pub fn is_terminal(&self) -> bool {
		!matches!(self, OrderStatus::Pending)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Approved => "approved",
			OrderStatus::Rejected => "rejected",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"approved" => Ok(Self::Approved),
			"rejected" => Ok(Self::Rejected),
			other => Err(format!("unknown order status '{}'", other)),
		}
	}
}

/// Administrator decision on a pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
	Approve,
	Reject,
}

impl ReviewDecision {
	/// Status an order ends up in after this decision.
	pub fn target_status(&self) -> OrderStatus {
		match self {
			ReviewDecision::Approve => OrderStatus::Approved,
			ReviewDecision::Reject => OrderStatus::Rejected,
		}
	}
}

impl fmt::Display for ReviewDecision {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReviewDecision::Approve => write!(f, "approve"),
			ReviewDecision::Reject => write!(f, "reject"),
		}
	}
}

/// The `(university, department)` pair unlocked by an approved order.
///
/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessGrant {
	pub university_id: u64,
	pub department_id: u64,
}

impl AccessGrant {
	/// Navigable reference handed to the resource listing.
	pub fn resource_path(&self) -> String {
		format!(
			"/resources?university={}&department={}",
			self.university_id, self.department_id
		)
	}
}
