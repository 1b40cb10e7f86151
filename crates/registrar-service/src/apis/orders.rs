//! Requester-facing order endpoints.
//!
//! Submissions arrive as JSON with the payment evidence base64-encoded. The
//! `latest` endpoint is what a remote synchronizer polls.

use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use base64::Engine;
use registrar_core::handlers::{ArtifactFile, SubmissionForm};
use registrar_orders::OrderRepository;
use registrar_types::{
	truncate_id, APIError, IdentityKey, LatestOrderQuery, Order, OrderId, OrderView,
	SubmitOrderRequest, SubmitOrderResponse, WorkflowError,
};
use tracing::{info, warn};

/// Decodes a submission body into the form the submission handler expects.
pub fn decode_submission(request: SubmitOrderRequest) -> Result<SubmissionForm, APIError> {
	let artifact = match request.artifact {
		Some(upload) => {
			let bytes = base64::engine::general_purpose::STANDARD
				.decode(upload.content_base64.as_bytes())
				.map_err(|e| {
					APIError::bad_request("INVALID_ARTIFACT", format!("Artifact is not valid base64: {}", e))
				})?;
			Some(ArtifactFile {
				file_name: upload.file_name,
				bytes,
			})
		},
		None => None,
	};

	Ok(SubmissionForm {
		university_id: request.university_id,
		department_id: request.department_id,
		full_name: request.full_name,
		requester_handle: request.requester_handle,
		auth_identity: request.auth_identity.filter(|id| !id.trim().is_empty()),
		artifact,
	})
}

/// Lookup keys of a `latest` query, provider id first.
pub fn query_keys(query: LatestOrderQuery) -> Vec<IdentityKey> {
	let auth = query
		.auth
		.filter(|v| !v.trim().is_empty())
		.map(IdentityKey::Auth);
	let handle = query
		.handle
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
		.map(IdentityKey::Handle);
	auth.into_iter().chain(handle).collect()
}

/// Handles POST /api/orders.
pub async fn submit_order(
	State(state): State<AppState>,
	Json(request): Json<SubmitOrderRequest>,
) -> Result<(StatusCode, Json<SubmitOrderResponse>), APIError> {
	let form = decode_submission(request)?;
	let handle = truncate_id(form.requester_handle.trim());

	match state.engine.submissions().submit(form).await {
		Ok(receipt) => {
			info!(order_id = receipt.order_id, handle = %handle, "Accepted submission");
			Ok((StatusCode::CREATED, Json(receipt.into())))
		},
		Err(e) => {
			warn!(handle = %handle, error = %e, "Submission failed");
			Err(WorkflowError::from(e).into())
		},
	}
}

/// Handles GET /api/orders/latest.
pub async fn latest_order(
	State(state): State<AppState>,
	Query(query): Query<LatestOrderQuery>,
) -> Result<Json<OrderView>, APIError> {
	let keys = query_keys(query);
	if keys.is_empty() {
		return Err(APIError::bad_request(
			"MISSING_IDENTITY",
			"Either a handle or an auth identity is required",
		));
	}

	match state.engine.synchronizer().poll_once(&keys).await {
		Ok(Some(view)) => Ok(Json(view)),
		Ok(None) => Err(APIError::not_found(
			"ORDER_NOT_FOUND",
			"No order found for the given identity",
		)),
		Err(e) => {
			warn!(error = %e, "Latest order lookup failed");
			Err(e.into())
		},
	}
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
) -> Result<Json<Order>, APIError> {
	match state.engine.repository().get_by_id(id).await {
		Ok(Some(order)) => Ok(Json(order)),
		Ok(None) => Err(APIError::not_found(
			"ORDER_NOT_FOUND",
			format!("Order {} not found", id),
		)),
		Err(e) => {
			warn!(order_id = id, error = %e, "Order retrieval failed");
			Err(WorkflowError::from(e).into())
		},
	}
}
