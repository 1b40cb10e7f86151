//! Serves artifacts behind signed URLs.

use crate::server::AppState;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use registrar_blob::SignatureParams;
use registrar_types::{APIError, WorkflowError};

/// Content type guessed from the path's extension.
fn content_type(path: &str) -> &'static str {
	let extension = path
		.rsplit_once('.')
		.map(|(_, ext)| ext.to_ascii_lowercase())
		.unwrap_or_default();
	match extension.as_str() {
		"png" => "image/png",
		"jpg" | "jpeg" => "image/jpeg",
		"gif" => "image/gif",
		"webp" => "image/webp",
		"pdf" => "application/pdf",
		_ => "application/octet-stream",
	}
}

/// Handles GET /artifacts/{*path}.
///
/// Every verification failure answers 404 so a caller learns nothing about
/// which artifacts exist.
pub async fn open_artifact(
	State(state): State<AppState>,
	Path(path): Path<String>,
	Query(params): Query<SignatureParams>,
) -> Result<Response, APIError> {
	let bytes = state
		.engine
		.issuer()
		.open(&path, &params)
		.await
		.map_err(|e| APIError::from(WorkflowError::from(e)))?;

	Ok(([(header::CONTENT_TYPE, content_type(&path))], bytes).into_response())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_content_type_by_extension() {
		assert_eq!(content_type("screenshot/alice-1.PNG"), "image/png");
		assert_eq!(content_type("screenshot/alice-1.jpeg"), "image/jpeg");
		assert_eq!(content_type("screenshot/alice-1.bin"), "application/octet-stream");
		assert_eq!(content_type("screenshot/alice"), "application/octet-stream");
	}
}
