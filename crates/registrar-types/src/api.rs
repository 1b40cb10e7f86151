//! HTTP API request and response types.
//!
//! Shared by the axum server and the HTTP gateway used by the `watch` and
//! `submit` client commands.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Order, OrderId, ReviewDecision, WorkflowError};

/// Order submission body.
///
/// Selections are optional on the wire so that a missing choice is reported
/// as a validation failure rather than a decoding error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOrderRequest {
	pub university_id: Option<u64>,
	pub department_id: Option<u64>,
	#[serde(default)]
	pub full_name: String,
	#[serde(default)]
	pub requester_handle: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub auth_identity: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifact: Option<ArtifactUpload>,
}

/// Payment evidence attached to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactUpload {
	/// Original file name; only its extension is kept.
	pub file_name: String,
	/// Standard base64 of the file contents.
	pub content_base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrderResponse {
	pub order_id: OrderId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub artifact_path: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview_url: Option<String>,
}

/// An order as seen by the requester, with a short-lived evidence preview
/// while it is still pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
	pub order: Order,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub preview_url: Option<String>,
}

/// Query of `GET /api/orders/latest`. At least one key is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatestOrderQuery {
	pub handle: Option<String>,
	pub auth: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReviewRequest {
	pub decision: ReviewDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
	pub order: Order,
	/// False when the order already had the requested status.
	pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrlResponse {
	pub url: String,
	/// Unix timestamp after which the URL stops working.
	pub expires_at: u64,
}

/// API error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable error code.
	pub error: String,
	/// Human-readable description.
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds.
	#[serde(rename = "retryAfter", default, skip_serializing_if = "Option::is_none")]
	pub retry_after: Option<u64>,
}

/// Error returned by HTTP handlers, mapped onto a status code.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400).
	BadRequest { error_type: String, message: String },
	/// Missing or wrong admin token (401).
	Unauthorized { message: String },
	/// Unknown order or artifact (404).
	NotFound { error_type: String, message: String },
	/// Order already reviewed the other way (409).
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Form failed validation (422).
	UnprocessableEntity { error_type: String, message: String },
	/// A backing store is down; retry later (503).
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Anything else (500).
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn not_found(error_type: &str, message: impl Into<String>) -> Self {
		APIError::NotFound {
			error_type: error_type.to_string(),
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: message.into(),
		}
	}

	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message) = match self {
			APIError::Unauthorized { message } => ("UNAUTHORIZED", message),
			APIError::BadRequest {
				error_type,
				message,
			}
			| APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
				..
			}
			| APIError::UnprocessableEntity {
				error_type,
				message,
			}
			| APIError::ServiceUnavailable {
				error_type,
				message,
				..
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type.as_str(), message),
		};

		ErrorResponse {
			error: error.to_string(),
			message: message.clone(),
			details: match self {
				APIError::Conflict { details, .. } => details.clone(),
				_ => None,
			},
			retry_after: match self {
				APIError::ServiceUnavailable { retry_after, .. } => *retry_after,
				_ => None,
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

impl From<WorkflowError> for APIError {
	fn from(err: WorkflowError) -> Self {
		let message = err.to_string();
		match err {
			WorkflowError::Validation(_) => APIError::UnprocessableEntity {
				error_type: "VALIDATION_FAILED".to_string(),
				message,
			},
			WorkflowError::StoreUnavailable(_) => APIError::ServiceUnavailable {
				error_type: "STORE_UNAVAILABLE".to_string(),
				message,
				retry_after: Some(5),
			},
			WorkflowError::NotFound(_) => APIError::not_found("NOT_FOUND", message),
			WorkflowError::InvalidTransition { from, to } => APIError::Conflict {
				error_type: "INVALID_TRANSITION".to_string(),
				message,
				details: Some(serde_json::json!({ "from": from, "to": to })),
			},
		}
	}
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
