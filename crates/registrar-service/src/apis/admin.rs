//! Administrator endpoints. Mounted behind the admin token check.

use crate::server::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use registrar_types::{
	APIError, Order, OrderId, ReviewRequest, ReviewResponse, SignedUrlResponse, WorkflowError,
};
use tracing::warn;

/// Handles GET /api/admin/orders.
pub async fn list_orders(State(state): State<AppState>) -> Result<Json<Vec<Order>>, APIError> {
	state
		.engine
		.reviewer()
		.list_orders()
		.await
		.map(Json)
		.map_err(|e| {
			warn!(error = %e, "Listing orders failed");
			WorkflowError::from(e).into()
		})
}

/// Handles POST /api/admin/orders/{id}/review.
///
/// Repeating a decision answers 200 with `changed: false`; the opposite
/// decision on a decided order answers 409.
pub async fn review_order(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
	Json(request): Json<ReviewRequest>,
) -> Result<Json<ReviewResponse>, APIError> {
	match state.engine.reviewer().review(id, request.decision).await {
		Ok(outcome) => Ok(Json(ReviewResponse {
			changed: outcome.changed(),
			order: outcome.into_order(),
		})),
		Err(e) => {
			warn!(order_id = id, decision = %request.decision, error = %e, "Review failed");
			Err(WorkflowError::from(e).into())
		},
	}
}

/// Handles GET /api/admin/orders/{id}/artifact.
pub async fn artifact_url(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
) -> Result<Json<SignedUrlResponse>, APIError> {
	match state.engine.reviewer().artifact_url(id).await {
		Ok(signed) => Ok(Json(SignedUrlResponse {
			url: signed.url,
			expires_at: signed.expires_at,
		})),
		Err(e) => {
			warn!(order_id = id, error = %e, "Artifact URL issuance failed");
			Err(WorkflowError::from(e).into())
		},
	}
}

/// Handles POST /api/admin/orders/{id}/artifact/revoke.
///
/// Answers 204; URLs issued for the artifact before the call stop working.
pub async fn revoke_artifact(
	State(state): State<AppState>,
	Path(id): Path<OrderId>,
) -> Result<StatusCode, APIError> {
	match state.engine.reviewer().revoke_artifact(id).await {
		Ok(()) => Ok(StatusCode::NO_CONTENT),
		Err(e) => {
			warn!(order_id = id, error = %e, "Artifact revocation failed");
			Err(WorkflowError::from(e).into())
		},
	}
}
