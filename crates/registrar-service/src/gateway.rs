//! HTTP client side of the registrar API.
//!
//! Lets the `submit` and `watch` commands drive a [`RequesterSession`] whose
//! orders live on a remote registrar: the gateway is both the session's
//! [`OrderSubmitter`] and its synchronizer's [`OrderSource`].
//!
//! [`RequesterSession`]: registrar_core::RequesterSession

use async_trait::async_trait;
use base64::Engine;
use registrar_core::handlers::{OrderSubmitter, SubmissionForm, SubmissionReceipt};
use registrar_core::sync::OrderSource;
use registrar_types::{
	truncate_id, ArtifactUpload, ErrorResponse, IdentityKey, OrderView, SubmitOrderRequest,
	SubmitOrderResponse, WorkflowError,
};
use reqwest::{Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("Invalid server URL '{0}': {1}")]
	InvalidUrl(String, String),
	#[error("HTTP client error: {0}")]
	Client(String),
}

pub struct HttpGateway {
	client: reqwest::Client,
	base_url: Url,
}

impl HttpGateway {
	pub fn new(server: &str, timeout: Duration) -> Result<Self, GatewayError> {
		let base_url =
			Url::parse(server).map_err(|e| GatewayError::InvalidUrl(server.to_string(), e.to_string()))?;
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| GatewayError::Client(e.to_string()))?;
		Ok(Self { client, base_url })
	}

	fn endpoint(&self, path: &str) -> Result<Url, WorkflowError> {
		self.base_url
			.join(path)
			.map_err(|e| WorkflowError::Validation(format!("invalid endpoint '{}': {}", path, e)))
	}

	/// Maps a non-success response onto the workflow error it reports.
	async fn error_from(response: Response) -> WorkflowError {
		let status = response.status();
		let message = match response.json::<ErrorResponse>().await {
			Ok(body) => body.message,
			Err(_) => format!("server answered {}", status),
		};
		match status {
			StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
				WorkflowError::Validation(message)
			},
			StatusCode::NOT_FOUND => WorkflowError::NotFound(message),
			_ => WorkflowError::StoreUnavailable(message),
		}
	}
}

fn transport(e: reqwest::Error) -> WorkflowError {
	WorkflowError::StoreUnavailable(e.to_string())
}

fn encode_submission(form: SubmissionForm) -> SubmitOrderRequest {
	SubmitOrderRequest {
		university_id: form.university_id,
		department_id: form.department_id,
		full_name: form.full_name,
		requester_handle: form.requester_handle,
		auth_identity: form.auth_identity,
		artifact: form.artifact.map(|file| ArtifactUpload {
			content_base64: base64::engine::general_purpose::STANDARD.encode(&file.bytes),
			file_name: file.file_name,
		}),
	}
}

#[async_trait]
impl OrderSource for HttpGateway {
	async fn latest_for(&self, key: &IdentityKey) -> Result<Option<OrderView>, WorkflowError> {
		let url = self.endpoint("/api/orders/latest")?;
		let response = self
			.client
			.get(url)
			.query(&[(key.kind(), key.value())])
			.send()
			.await
			.map_err(transport)?;

		if response.status().is_success() {
			return response.json::<OrderView>().await.map(Some).map_err(transport);
		}
		if response.status() == StatusCode::NOT_FOUND {
			// Only an explicit "no order" means none; a wrong route is an outage.
			if let Ok(body) = response.json::<ErrorResponse>().await {
				if body.error == "ORDER_NOT_FOUND" {
					debug!(key = %key.kind(), value = %truncate_id(key.value()), "No order yet");
					return Ok(None);
				}
			}
			return Err(WorkflowError::StoreUnavailable(
				"latest order endpoint not found".to_string(),
			));
		}
		Err(Self::error_from(response).await)
	}
}

#[async_trait]
impl OrderSubmitter for HttpGateway {
	async fn submit(&self, form: SubmissionForm) -> Result<SubmissionReceipt, WorkflowError> {
		let url = self.endpoint("/api/orders")?;
		let response = self
			.client
			.post(url)
			.json(&encode_submission(form))
			.send()
			.await
			.map_err(transport)?;

		if !response.status().is_success() {
			return Err(Self::error_from(response).await);
		}
		let created: SubmitOrderResponse = response.json().await.map_err(transport)?;
		Ok(SubmissionReceipt {
			order_id: created.order_id,
			artifact_path: created.artifact_path,
			preview_url: created.preview_url,
		})
	}
}
