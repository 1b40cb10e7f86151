//! Signed read URLs.
//!
//! A URL grants read access to one artifact until its expiry. It carries the
//! issue time, the expiry and an HMAC-SHA256 over
//! `bucket \n path \n issued \n expires \n generation`, so it cannot be
//! derived from the artifact path alone. The generation is a per-path
//! revocation counter kept by the signer and never sent in the URL: revoking
//! a path bumps it, which invalidates every URL issued for the path so far
//! and leaves URLs signed afterwards valid, even within the same second.

use hmac::{Hmac, Mac};
use registrar_types::SecretString;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningError {
	#[error("URL expired")]
	Expired,
	#[error("Signature verification failed")]
	BadSignature,
	#[error("URL was revoked")]
	Revoked,
	#[error("Malformed URL parameters: {0}")]
	Malformed(String),
	#[error("Signing key rejected")]
	InvalidKey,
}

/// An issued read URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
	pub url: String,
	/// Unix timestamp after which the URL is rejected.
	pub expires_at: u64,
}

/// Query parameters of a presented URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureParams {
	pub issued: u64,
	pub expires: u64,
	pub signature: String,
}

pub struct UrlSigner {
	secret: SecretString,
	bucket: String,
	base_url: Url,
	clock_skew: Duration,
	/// Path to its revocation generation; absent means zero.
	generations: RwLock<HashMap<String, u64>>,
}

impl UrlSigner {
	pub fn new(
		secret: SecretString,
		bucket: impl Into<String>,
		base_url: Url,
		clock_skew: Duration,
	) -> Self {
		Self {
			secret,
			bucket: bucket.into(),
			base_url,
			clock_skew,
			generations: RwLock::new(HashMap::new()),
		}
	}

	fn mac(
		&self,
		path: &str,
		issued: u64,
		expires: u64,
		generation: u64,
	) -> Result<HmacSha256, SigningError> {
		let mut mac = self
			.secret
			.with_exposed(|key| HmacSha256::new_from_slice(key.as_bytes()))
			.map_err(|_| SigningError::InvalidKey)?;
		mac.update(
			format!(
				"{}\n{}\n{}\n{}\n{}",
				self.bucket, path, issued, expires, generation
			)
			.as_bytes(),
		);
		Ok(mac)
	}

	fn generation(&self, path: &str) -> u64 {
		self.generations
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.get(path)
			.copied()
			.unwrap_or(0)
	}

	fn signature_matches(
		&self,
		path: &str,
		params: &SignatureParams,
		generation: u64,
		provided: &[u8],
	) -> Result<bool, SigningError> {
		let expected = self
			.mac(path, params.issued, params.expires, generation)?
			.finalize()
			.into_bytes();
		Ok(bool::from(expected.as_slice().ct_eq(provided)))
	}

	/// Signs `path` for `ttl`, counting from `now`.
	pub fn sign_at(&self, path: &str, ttl: Duration, now: u64) -> Result<SignedUrl, SigningError> {
		let expires = now.saturating_add(ttl.as_secs());
		let generation = self.generation(path);
		let signature = hex::encode(
			self.mac(path, now, expires, generation)?
				.finalize()
				.into_bytes(),
		);

		let mut url = self.base_url.clone();
		if let Ok(mut segments) = url.path_segments_mut() {
			segments.pop_if_empty().push("artifacts").extend(path.split('/'));
		}
		url.query_pairs_mut()
			.append_pair("issued", &now.to_string())
			.append_pair("expires", &expires.to_string())
			.append_pair("signature", &signature);

		Ok(SignedUrl {
			url: url.to_string(),
			expires_at: expires,
		})
	}

	/// Checks a presented URL for `path` at time `now`.
	///
	/// A URL stays valid through `expires + clock_skew` and is rejected
	/// strictly after. A URL signed under an earlier generation of `path` is
	/// `Revoked`.
	pub fn verify_at(
		&self,
		path: &str,
		params: &SignatureParams,
		now: u64,
	) -> Result<(), SigningError> {
		let provided = hex::decode(&params.signature)
			.map_err(|_| SigningError::Malformed("signature is not hex".into()))?;
		let current = self.generation(path);
		if !self.signature_matches(path, params, current, &provided)? {
			for earlier in (0..current).rev() {
				if self.signature_matches(path, params, earlier, &provided)? {
					return Err(SigningError::Revoked);
				}
			}
			return Err(SigningError::BadSignature);
		}

		if params.issued > params.expires {
			return Err(SigningError::Malformed("issued after expiry".into()));
		}
		if now > params.expires.saturating_add(self.clock_skew.as_secs()) {
			return Err(SigningError::Expired);
		}
		Ok(())
	}

	/// Invalidates every URL issued for `path` so far. Returns the new
	/// generation.
	pub fn revoke(&self, path: &str) -> u64 {
		let mut generations = self.generations.write().unwrap_or_else(|e| e.into_inner());
		let generation = generations.entry(path.to_string()).or_insert(0);
		*generation += 1;
		*generation
	}
}
