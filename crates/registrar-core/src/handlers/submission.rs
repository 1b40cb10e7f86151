//! Registration submission.
//!
//! A submission is validated in full before anything is written. The payment
//! evidence is uploaded first and the order row is inserted only after the
//! upload succeeded, so a stored order never points at a missing artifact.

use async_trait::async_trait;
use registrar_blob::{ArtifactAccessIssuer, BlobError};
use registrar_orders::{OrderError, OrderRepository};
use registrar_types::{
	current_timestamp_millis, truncate_id, Catalog, NewOrder, OrderId, SubmitOrderResponse,
	WorkflowError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Directory inside the bucket that holds payment screenshots.
const ARTIFACT_DIR: &str = "screenshot";

#[derive(Debug, Error)]
pub enum SubmissionError {
	/// The form is incomplete or inconsistent. Nothing was written.
	#[error("{0}")]
	Invalid(String),
	#[error("Artifact upload failed: {0}")]
	Upload(#[from] BlobError),
	#[error("Repository error: {0}")]
	Repository(String),
}

impl From<OrderError> for SubmissionError {
	fn from(err: OrderError) -> Self {
		SubmissionError::Repository(err.to_string())
	}
}

impl From<SubmissionError> for WorkflowError {
	fn from(err: SubmissionError) -> Self {
		match err {
			SubmissionError::Invalid(detail) => WorkflowError::Validation(detail),
			SubmissionError::Upload(e) => e.into(),
			SubmissionError::Repository(e) => WorkflowError::StoreUnavailable(e),
		}
	}
}

/// An uploaded payment screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
	/// Name of the file on the requester's side; only its extension is kept.
	pub file_name: String,
	pub bytes: Vec<u8>,
}

impl ArtifactFile {
	/// Lowercase alphanumeric extension of the original file name, `bin` if
	/// there is none.
	pub fn extension(&self) -> String {
		self.file_name
			.rsplit_once('.')
			.map(|(_, ext)| ext.to_ascii_lowercase())
			.filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
			.unwrap_or_else(|| "bin".to_string())
	}
}

/// The registration form as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionForm {
	pub university_id: Option<u64>,
	pub department_id: Option<u64>,
	pub full_name: String,
	pub requester_handle: String,
	pub auth_identity: Option<String>,
	pub artifact: Option<ArtifactFile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
	pub order_id: OrderId,
	pub artifact_path: Option<String>,
	/// Short-lived URL of the uploaded artifact. Absent if there is no
	/// artifact or the URL could not be issued.
	pub preview_url: Option<String>,
}

impl From<SubmissionReceipt> for SubmitOrderResponse {
	fn from(receipt: SubmissionReceipt) -> Self {
		SubmitOrderResponse {
			order_id: receipt.order_id,
			artifact_path: receipt.artifact_path,
			preview_url: receipt.preview_url,
		}
	}
}

/// Anything that accepts registration forms, in process or over the wire.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
	async fn submit(&self, form: SubmissionForm) -> Result<SubmissionReceipt, WorkflowError>;
}

/// Submission settings taken from the `[blob]` section.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
	pub require_artifact: bool,
	pub max_artifact_bytes: usize,
	pub preview_ttl: Duration,
}

/// Validated fields ready to be written.
struct Validated {
	order: NewOrder,
	artifact: Option<ArtifactFile>,
}

/// Turns registration forms into stored pending orders.
pub struct SubmissionHandler {
	repository: Arc<dyn OrderRepository>,
	issuer: Arc<ArtifactAccessIssuer>,
	catalog: Catalog,
	policy: SubmissionPolicy,
}

impl SubmissionHandler {
	pub fn new(
		repository: Arc<dyn OrderRepository>,
		issuer: Arc<ArtifactAccessIssuer>,
		catalog: Catalog,
		policy: SubmissionPolicy,
	) -> Self {
		Self {
			repository,
			issuer,
			catalog,
			policy,
		}
	}

	fn validate(&self, form: SubmissionForm) -> Result<Validated, SubmissionError> {
		let invalid = |msg: &str| SubmissionError::Invalid(msg.to_string());

		let university_id = form
			.university_id
			.ok_or_else(|| invalid("university is required"))?;
		let department_id = form
			.department_id
			.ok_or_else(|| invalid("department is required"))?;
		let full_name = form.full_name.trim();
		if full_name.is_empty() {
			return Err(invalid("full name is required"));
		}
		let handle = form.requester_handle.trim();
		if handle.is_empty() {
			return Err(invalid("handle is required"));
		}
		if !self.catalog.is_valid_selection(university_id, department_id) {
			return Err(SubmissionError::Invalid(format!(
				"department {} is not offered by university {}",
				department_id, university_id
			)));
		}

		match &form.artifact {
			None if self.policy.require_artifact => {
				return Err(invalid("payment screenshot is required"))
			},
			Some(file) if file.bytes.is_empty() => {
				return Err(invalid("payment screenshot is empty"))
			},
			Some(file) if file.bytes.len() > self.policy.max_artifact_bytes => {
				return Err(SubmissionError::Invalid(format!(
					"payment screenshot exceeds {} bytes",
					self.policy.max_artifact_bytes
				)))
			},
			_ => {},
		}

		Ok(Validated {
			order: NewOrder {
				university_id,
				department_id,
				full_name: full_name.to_string(),
				requester_handle: handle.to_string(),
				auth_identity: form
					.auth_identity
					.filter(|id| !id.trim().is_empty()),
				artifact_path: None,
			},
			artifact: form.artifact,
		})
	}

	/// Validates the form, uploads the artifact and inserts a pending order.
	#[instrument(skip_all, fields(handle = %truncate_id(&form.requester_handle)))]
	pub async fn submit(&self, form: SubmissionForm) -> Result<SubmissionReceipt, SubmissionError> {
		let Validated {
			mut order,
			artifact,
		} = self.validate(form)?;

		if let Some(file) = artifact {
			let path = artifact_path(&order.requester_handle, &file, current_timestamp_millis());
			self.issuer.blobs().upload(&path, file.bytes).await?;
			order.artifact_path = Some(path);
		}

		let artifact_path = order.artifact_path.clone();
		let order_id = match self.repository.insert(order).await {
			Ok(id) => id,
			Err(e) => {
				if let Some(path) = &artifact_path {
					warn!(path = %path, "Order insert failed after upload, artifact left unreferenced");
				}
				return Err(e.into());
			},
		};
		info!(order_id, "Registration submitted");

		let preview_url = match &artifact_path {
			Some(path) => match self.issuer.issue_read_url(path, self.policy.preview_ttl).await {
				Ok(signed) => Some(signed.url),
				Err(e) => {
					warn!(order_id, error = %e, "Preview unavailable");
					None
				},
			},
			None => None,
		};

		Ok(SubmissionReceipt {
			order_id,
			artifact_path,
			preview_url,
		})
	}
}

#[async_trait]
impl OrderSubmitter for SubmissionHandler {
	async fn submit(&self, form: SubmissionForm) -> Result<SubmissionReceipt, WorkflowError> {
		SubmissionHandler::submit(self, form)
			.await
			.map_err(WorkflowError::from)
	}
}

/// `screenshot/{handle}-{millis}.{ext}`. Handle bytes other than ASCII
/// letters, digits and `-` are written as `_xx` in hex, so distinct handles
/// never share a path.
fn artifact_path(handle: &str, file: &ArtifactFile, millis: u128) -> String {
	let mut segment = String::with_capacity(handle.len());
	for byte in handle.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' {
			segment.push(char::from(byte));
		} else {
			segment.push_str(&format!("_{:02x}", byte));
		}
	}
	format!("{}/{}-{}.{}", ARTIFACT_DIR, segment, millis, file.extension())
}

#[cfg(test)]
mod tests {
	use super::*;
	use registrar_blob::implementations::memory::MemoryBlobStore;
	use registrar_blob::{BlobService, UrlSigner};
	use registrar_config::ConfigBuilder;
	use registrar_orders::{MockOrderRepository, StoredOrderRepository};
	use registrar_storage::implementations::memory::MemoryStorage;
	use registrar_storage::StorageService;
	use registrar_types::{IdentityKey, OrderStatus, SecretString};
	use url::Url;

	fn issuer() -> Arc<ArtifactAccessIssuer> {
		let blobs = Arc::new(BlobService::new(Box::new(MemoryBlobStore::new()), "payment"));
		let signer = UrlSigner::new(
			SecretString::from("test-signing-secret"),
			"payment",
			Url::parse("http://127.0.0.1:3000").unwrap(),
			Duration::ZERO,
		);
		Arc::new(ArtifactAccessIssuer::new(
			blobs,
			signer,
			Duration::from_secs(3600),
		))
	}

	fn policy(require_artifact: bool) -> SubmissionPolicy {
		SubmissionPolicy {
			require_artifact,
			max_artifact_bytes: 16,
			preview_ttl: Duration::from_secs(60),
		}
	}

	fn form(handle: &str) -> SubmissionForm {
		SubmissionForm {
			university_id: Some(3),
			department_id: Some(7),
			full_name: " Alice Example ".into(),
			requester_handle: handle.into(),
			auth_identity: None,
			artifact: Some(ArtifactFile {
				file_name: "receipt.PNG".into(),
				bytes: b"png-bytes".to_vec(),
			}),
		}
	}

	fn catalog() -> Catalog {
		ConfigBuilder::new().build().catalog
	}

	#[tokio::test]
	async fn test_submit_uploads_then_inserts_pending_order() {
		let repository = Arc::new(StoredOrderRepository::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))));
		let issuer = issuer();
		let handler =
			SubmissionHandler::new(repository.clone(), issuer.clone(), catalog(), policy(true));

		let receipt = handler.submit(form("alice")).await.unwrap();
		let path = receipt.artifact_path.clone().unwrap();
		assert!(path.starts_with("screenshot/alice-"));
		assert!(path.ends_with(".png"));
		assert!(issuer.blobs().exists(&path).await.unwrap());
		assert!(receipt.preview_url.unwrap().contains("signature="));

		let order = repository
			.find_latest_by_identity(&IdentityKey::Handle("alice".into()))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(order.id, receipt.order_id);
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.full_name, "Alice Example");
		assert_eq!(order.artifact_path.as_deref(), Some(path.as_str()));
	}

	#[tokio::test]
	async fn test_missing_artifact_writes_nothing() {
		let mut repository = MockOrderRepository::new();
		repository.expect_insert().never();
		let issuer = issuer();
		let handler = SubmissionHandler::new(Arc::new(repository), issuer, catalog(), policy(true));

		let mut form = form("alice");
		form.artifact = None;
		let err = handler.submit(form).await.unwrap_err();
		assert!(matches!(
			WorkflowError::from(err),
			WorkflowError::Validation(_)
		));
	}

	#[tokio::test]
	async fn test_rejects_incomplete_or_inconsistent_forms() {
		let mut repository = MockOrderRepository::new();
		repository.expect_insert().never();
		let handler =
			SubmissionHandler::new(Arc::new(repository), issuer(), catalog(), policy(true));

		let mut no_university = form("alice");
		no_university.university_id = None;
		let mut blank_name = form("alice");
		blank_name.full_name = "  ".into();
		let mut foreign_department = form("alice");
		foreign_department.department_id = Some(8);
		let mut oversized = form("alice");
		oversized.artifact = Some(ArtifactFile {
			file_name: "big.jpg".into(),
			bytes: vec![0; 17],
		});

		for form in [no_university, blank_name, foreign_department, oversized, form(" ")] {
			assert!(matches!(
				handler.submit(form).await,
				Err(SubmissionError::Invalid(_))
			));
		}
	}

	#[tokio::test]
	async fn test_artifact_optional_when_not_required() {
		let repository = Arc::new(StoredOrderRepository::new(Arc::new(StorageService::new(
			Box::new(MemoryStorage::new()),
		))));
		let handler = SubmissionHandler::new(repository, issuer(), catalog(), policy(false));

		let mut form = form("bob");
		form.artifact = None;
		let receipt = handler.submit(form).await.unwrap();
		assert_eq!(receipt.artifact_path, None);
		assert_eq!(receipt.preview_url, None);
	}

	#[tokio::test]
	async fn test_repository_failure_is_retryable() {
		let mut repository = MockOrderRepository::new();
		repository
			.expect_insert()
			.times(1)
			.returning(|_| Err(OrderError::Storage("timeout".into())));
		let handler = SubmissionHandler::new(Arc::new(repository), issuer(), catalog(), policy(true));

		let err = handler.submit(form("alice")).await.unwrap_err();
		assert!(WorkflowError::from(err).is_retryable());
	}

	#[test]
	fn test_artifact_path_format() {
		let file = |name: &str| ArtifactFile {
			file_name: name.into(),
			bytes: vec![1],
		};
		assert_eq!(
			artifact_path("alice", &file("shot.JPG"), 1700000000123),
			"screenshot/alice-1700000000123.jpg"
		);
		assert_eq!(
			artifact_path("@bob/../x", &file("noext"), 5),
			"screenshot/_40bob_2f_2e_2e_2fx-5.bin"
		);
		assert_eq!(file("weird.p/ng").extension(), "bin");
	}

	#[test]
	fn test_non_ascii_handles_get_distinct_paths() {
		let file = ArtifactFile {
			file_name: "shot.png".into(),
			bytes: vec![1],
		};
		let paths: Vec<String> = ["josé", "josè", "jos_", "jos_c3_a9", "李"]
			.iter()
			.map(|handle| artifact_path(handle, &file, 1700000000123))
			.collect();

		assert_eq!(paths[0], "screenshot/jos_c3_a9-1700000000123.png");
		assert_eq!(paths[4], "screenshot/_e6_9d_8e-1700000000123.png");
		for (i, path) in paths.iter().enumerate() {
			assert!(!paths[i + 1..].contains(path), "{} is shared", path);
		}
	}
}
