use crate::{BlobError, BlobService, SignatureParams, SignedUrl, SigningError, UrlSigner};
use registrar_types::{current_timestamp, truncate_id};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Issues and checks time-limited read URLs for stored artifacts.
///
/// Used for both the submitter's preview and the administrator's review of
/// the payment evidence.
pub struct ArtifactAccessIssuer {
	blobs: Arc<BlobService>,
	signer: UrlSigner,
	max_ttl: Duration,
}

impl ArtifactAccessIssuer {
	pub fn new(blobs: Arc<BlobService>, signer: UrlSigner, max_ttl: Duration) -> Self {
		Self {
			blobs,
			signer,
			max_ttl,
		}
	}

	pub fn blobs(&self) -> &Arc<BlobService> {
		&self.blobs
	}

	pub async fn issue_read_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, BlobError> {
		self.issue_read_url_at(path, ttl, current_timestamp()).await
	}

	/// Fails with `NotFound` if no artifact is stored at `path`, and with
	/// `Backend` if the store could not be asked.
	pub async fn issue_read_url_at(
		&self,
		path: &str,
		ttl: Duration,
		now: u64,
	) -> Result<SignedUrl, BlobError> {
		if ttl.is_zero() || ttl > self.max_ttl {
			return Err(BlobError::InvalidTtl {
				requested: ttl.as_secs(),
				max: self.max_ttl.as_secs(),
			});
		}
		if !self.blobs.exists(path).await? {
			return Err(BlobError::NotFound(path.to_string()));
		}

		let signed = self.signer.sign_at(path, ttl, now).map_err(|e| match e {
			SigningError::InvalidKey => BlobError::Configuration(e.to_string()),
			e => BlobError::Denied(e),
		})?;
		debug!(path = %truncate_id(path), expires_at = signed.expires_at, "Issued read URL");
		Ok(signed)
	}

	/// Returns the artifact if the presented URL is valid for it.
	pub async fn open(&self, path: &str, params: &SignatureParams) -> Result<Vec<u8>, BlobError> {
		self.open_at(path, params, current_timestamp()).await
	}

	pub async fn open_at(
		&self,
		path: &str,
		params: &SignatureParams,
		now: u64,
	) -> Result<Vec<u8>, BlobError> {
		if let Err(e) = self.signer.verify_at(path, params, now) {
			warn!(path = %truncate_id(path), error = %e, "Rejected artifact URL");
			return Err(e.into());
		}
		self.blobs.download(path).await
	}

	/// Invalidates every URL issued so far for `path`. URLs issued after
	/// this returns are unaffected.
	pub fn revoke(&self, path: &str) {
		let generation = self.signer.revoke(path);
		debug!(path = %truncate_id(path), generation, "Revoked read URLs");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryBlobStore;
	use registrar_types::SecretString;
	use std::collections::HashMap;
	use url::Url;

	const PATH: &str = "screenshot/alice-1.png";
	const T: u64 = 1_700_000_000;

	async fn issuer() -> ArtifactAccessIssuer {
		let blobs = Arc::new(BlobService::new(Box::new(MemoryBlobStore::new()), "payment"));
		blobs.upload(PATH, b"evidence".to_vec()).await.unwrap();
		let signer = UrlSigner::new(
			SecretString::from("test-secret"),
			"payment",
			Url::parse("http://127.0.0.1:3000").unwrap(),
			Duration::ZERO,
		);
		ArtifactAccessIssuer::new(blobs, signer, Duration::from_secs(3600))
	}

	fn params_of(signed: &SignedUrl) -> SignatureParams {
		let query: HashMap<String, String> = Url::parse(&signed.url)
			.unwrap()
			.query_pairs()
			.into_owned()
			.collect();
		SignatureParams {
			issued: query["issued"].parse().unwrap(),
			expires: query["expires"].parse().unwrap(),
			signature: query["signature"].clone(),
		}
	}

	#[tokio::test]
	async fn test_issued_url_opens_until_expiry() {
		let issuer = issuer().await;
		let signed = issuer
			.issue_read_url_at(PATH, Duration::from_secs(60), T)
			.await
			.unwrap();
		let params = params_of(&signed);

		assert_eq!(issuer.open_at(PATH, &params, T + 59).await.unwrap(), b"evidence");
		assert!(matches!(
			issuer.open_at(PATH, &params, T + 61).await,
			Err(BlobError::Denied(SigningError::Expired))
		));
	}

	#[tokio::test]
	async fn test_missing_artifact_is_not_found() {
		let issuer = issuer().await;
		assert!(matches!(
			issuer
				.issue_read_url_at("screenshot/nobody-1.png", Duration::from_secs(60), T)
				.await,
			Err(BlobError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_ttl_must_be_within_bounds() {
		let issuer = issuer().await;
		for ttl in [0, 3601] {
			assert!(matches!(
				issuer
					.issue_read_url_at(PATH, Duration::from_secs(ttl), T)
					.await,
				Err(BlobError::InvalidTtl { .. })
			));
		}
	}

	#[tokio::test]
	async fn test_revoked_url_is_denied() {
		let issuer = issuer().await;
		let signed = issuer
			.issue_read_url(PATH, Duration::from_secs(60))
			.await
			.unwrap();
		issuer.revoke(PATH);
		assert!(matches!(
			issuer.open(PATH, &params_of(&signed)).await,
			Err(BlobError::Denied(SigningError::Revoked))
		));

		let reissued = issuer
			.issue_read_url(PATH, Duration::from_secs(60))
			.await
			.unwrap();
		assert_eq!(
			issuer.open(PATH, &params_of(&reissued)).await.unwrap(),
			b"evidence"
		);
	}
}
