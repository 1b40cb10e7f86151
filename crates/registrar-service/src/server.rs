//! HTTP server for the registrar API.
//!
//! Public routes serve the catalog and accept submissions; the synchronizer
//! of a remote client polls `/api/orders/latest`. Administrator routes under
//! `/api/admin` require the configured bearer token. Signed artifact URLs
//! resolve under `/artifacts`.

use crate::apis::{admin, artifacts, catalog, orders};
use axum::{
	extract::{DefaultBodyLimit, Request, State},
	http::{header, HeaderValue},
	middleware::{self, Next},
	response::Response,
	routing::{get, post},
	Router,
};
use registrar_config::ApiConfig;
use registrar_core::RegistrarEngine;
use registrar_types::{APIError, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the registrar engine for processing requests.
	pub engine: Arc<RegistrarEngine>,
	/// Bearer token for `/api/admin`. Without one every admin call is refused.
	pub admin_token: Option<SecretString>,
}

/// Builds the application router.
pub fn router(state: AppState, api_config: &ApiConfig) -> Router {
	let admin = Router::new()
		.route("/orders", get(admin::list_orders))
		.route("/orders/{id}/review", post(admin::review_order))
		.route("/orders/{id}/artifact", get(admin::artifact_url))
		.route("/orders/{id}/artifact/revoke", post(admin::revoke_artifact))
		.route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

	let api = Router::new()
		.route("/catalog/universities", get(catalog::list_universities))
		.route("/catalog/departments", get(catalog::list_departments))
		.route("/orders", post(orders::submit_order))
		.route("/orders/latest", get(orders::latest_order))
		.route("/orders/{id}", get(orders::get_order))
		.nest("/admin", admin);

	Router::new()
		.nest("/api", api)
		.route("/artifacts/{*path}", get(artifacts::open_artifact))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(cors_layer(api_config))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	let Some(cors) = &api_config.cors else {
		return CorsLayer::permissive();
	};

	let origins: Vec<HeaderValue> = cors
		.allowed_origins
		.iter()
		.filter_map(|origin| match origin.parse::<HeaderValue>() {
			Ok(value) => Some(value),
			Err(e) => {
				tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
				None
			},
		})
		.collect();

	CorsLayer::new()
		.allow_origin(origins)
		.allow_methods(Any)
		.allow_headers(Any)
}

/// Rejects admin requests without the configured bearer token.
async fn require_admin(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Result<Response, APIError> {
	let presented = request
		.headers()
		.get(header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "));

	match (&state.admin_token, presented) {
		(Some(token), Some(candidate)) if token.matches(candidate) => Ok(next.run(request).await),
		_ => {
			tracing::warn!(path = %request.uri().path(), "Rejected admin request");
			Err(APIError::Unauthorized {
				message: "A valid admin token is required".to_string(),
			})
		},
	}
}

/// Starts the HTTP server for the API.
///
/// Serves until the engine shuts down.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<RegistrarEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let state = AppState {
		admin_token: api_config.admin_token.clone(),
		engine: engine.clone(),
	};
	let app = router(state, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Registrar API server starting on {}", bind_address);

	let shutdown = engine.shutdown_token().clone();
	axum::serve(listener, app)
		.with_graceful_shutdown(async move { shutdown.cancelled().await })
		.await?;

	Ok(())
}
