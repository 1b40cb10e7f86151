//! Requester session.
//!
//! Everything a single requester does from one client: sign-in, submission,
//! deciding where to land on start-up and watching the latest order until it
//! is decided.

use crate::handlers::{OrderSubmitter, SubmissionForm, SubmissionReceipt};
use crate::sync::{ApprovalSynchronizer, SyncHandle};
use registrar_identity::{describe_keys, IdentityError, IdentityResolver};
use registrar_types::{
	truncate_id, AuthIdentity, Credentials, EntryRoute, SyncSignal, WorkflowError,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct RequesterSession {
	resolver: Arc<IdentityResolver>,
	submitter: Arc<dyn OrderSubmitter>,
	synchronizer: Arc<ApprovalSynchronizer>,
}

impl RequesterSession {
	pub fn new(
		resolver: Arc<IdentityResolver>,
		submitter: Arc<dyn OrderSubmitter>,
		synchronizer: Arc<ApprovalSynchronizer>,
	) -> Self {
		Self {
			resolver,
			submitter,
			synchronizer,
		}
	}

	pub fn resolver(&self) -> &Arc<IdentityResolver> {
		&self.resolver
	}

	/// Resources if the requester's latest order is approved, registration
	/// otherwise. A lookup failure also lands on registration.
	pub async fn entry_route(&self) -> EntryRoute {
		let keys = self.resolver.resolve().await;
		if keys.is_empty() {
			return EntryRoute::Register;
		}

		match self.synchronizer.poll_once(&keys).await {
			Ok(Some(view)) => match view.order.access_grant() {
				Some(grant) => {
					info!(order_id = view.order.id, "Resuming with approved registration");
					EntryRoute::Resources { grant }
				},
				None => EntryRoute::Register,
			},
			Ok(None) => EntryRoute::Register,
			Err(e) => {
				warn!(keys = %describe_keys(&keys), error = %e, "Latest order lookup failed");
				EntryRoute::Register
			},
		}
	}

	pub async fn sign_up(&self, credentials: &Credentials) -> Result<AuthIdentity, IdentityError> {
		self.resolver.provider().sign_up(credentials).await
	}

	/// Signs in and decides where the requester lands.
	pub async fn sign_in(&self, credentials: &Credentials) -> Result<EntryRoute, IdentityError> {
		self.resolver.provider().sign_in(credentials).await?;
		Ok(self.entry_route().await)
	}

	/// Signs out and forgets the remembered handle.
	pub async fn sign_out(&self) -> Result<(), IdentityError> {
		self.resolver.sign_out().await
	}

	/// Submits the form and remembers its handle for later visits.
	///
	/// The signed-in identity, if any, is attached to the order.
	pub async fn submit(
		&self,
		mut form: SubmissionForm,
	) -> Result<SubmissionReceipt, WorkflowError> {
		if form.auth_identity.is_none() {
			match self.resolver.provider().current_identity().await {
				Ok(identity) => form.auth_identity = identity.map(|i| i.id),
				Err(e) => warn!(error = %e, "Submitting without authenticated identity"),
			}
		}

		let handle = form.requester_handle.trim().to_string();
		let receipt = self.submitter.submit(form).await?;

		if let Err(e) = self.resolver.remember(&handle).await {
			warn!(handle = %truncate_id(&handle), error = %e, "Failed to remember handle");
		}
		Ok(receipt)
	}

	/// Starts watching the latest order. `None` if there is no identity yet.
	///
	/// Signing in or out while watching switches to the order of the new
	/// identity.
	pub async fn watch(
		&self,
		cancel: CancellationToken,
	) -> Option<(SyncHandle, mpsc::UnboundedReceiver<SyncSignal>)> {
		if self.resolver.resolve().await.is_empty() {
			debug!("No identity, nothing to watch");
			return None;
		}
		Some(
			self.synchronizer
				.spawn_following(Arc::clone(&self.resolver), cancel),
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::{ArtifactFile, SubmissionHandler, SubmissionPolicy};
	use crate::sync::{RepositoryOrderSource, SyncOutcome};
	use registrar_blob::implementations::memory::MemoryBlobStore;
	use registrar_blob::{ArtifactAccessIssuer, BlobService, UrlSigner};
	use registrar_config::ConfigBuilder;
	use registrar_identity::implementations::memory::MemoryIdentityProvider;
	use registrar_identity::HandleStore;
	use registrar_orders::{OrderRepository, StoredOrderRepository};
	use registrar_storage::implementations::memory::MemoryStorage;
	use registrar_storage::StorageService;
	use registrar_types::{AccessGrant, IdentityKey, NewOrder, OrderStatus, SecretString};
	use std::time::Duration;
	use url::Url;

	struct Fixture {
		repository: Arc<StoredOrderRepository>,
		session: RequesterSession,
	}

	fn fixture() -> Fixture {
		let storage = || Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let repository = Arc::new(StoredOrderRepository::new(storage()));
		let issuer = Arc::new(ArtifactAccessIssuer::new(
			Arc::new(BlobService::new(Box::new(MemoryBlobStore::new()), "payment")),
			UrlSigner::new(
				SecretString::from("secret"),
				"payment",
				Url::parse("http://127.0.0.1:3000").unwrap(),
				Duration::ZERO,
			),
			Duration::from_secs(3600),
		));
		let submissions = Arc::new(SubmissionHandler::new(
			repository.clone(),
			issuer.clone(),
			ConfigBuilder::new().build().catalog,
			SubmissionPolicy {
				require_artifact: true,
				max_artifact_bytes: 1024,
				preview_ttl: Duration::from_secs(60),
			},
		));
		let synchronizer = Arc::new(ApprovalSynchronizer::new(
			Arc::new(RepositoryOrderSource::new(repository.clone()).with_previews(issuer, Duration::from_secs(60))),
			Duration::from_secs(5),
			Duration::from_secs(2),
		));
		let resolver = Arc::new(IdentityResolver::new(
			Arc::new(MemoryIdentityProvider::new(6)),
			Arc::new(HandleStore::new(storage(), 0)),
		));

		Fixture {
			repository,
			session: RequesterSession::new(resolver, submissions, synchronizer),
		}
	}

	fn form(handle: &str) -> SubmissionForm {
		SubmissionForm {
			university_id: Some(3),
			department_id: Some(7),
			full_name: "Alice Example".into(),
			requester_handle: handle.into(),
			auth_identity: None,
			artifact: Some(ArtifactFile {
				file_name: "receipt.jpg".into(),
				bytes: b"jpeg".to_vec(),
			}),
		}
	}

	const GRANT: AccessGrant = AccessGrant {
		university_id: 3,
		department_id: 7,
	};

	#[tokio::test]
	async fn test_new_requester_registers() {
		let f = fixture();
		assert_eq!(f.session.entry_route().await, EntryRoute::Register);
		assert!(f.session.watch(CancellationToken::new()).await.is_none());
	}

	#[tokio::test]
	async fn test_auto_resume_with_remembered_handle() {
		let f = fixture();
		let receipt = f.session.submit(form("alice")).await.unwrap();
		assert_eq!(
			f.session.resolver().resolve().await,
			vec![IdentityKey::Handle("alice".into())]
		);
		assert_eq!(f.session.entry_route().await, EntryRoute::Register);

		f.repository
			.update_status(receipt.order_id, OrderStatus::Approved)
			.await
			.unwrap();
		assert_eq!(
			f.session.entry_route().await,
			EntryRoute::Resources { grant: GRANT }
		);
	}

	#[tokio::test]
	async fn test_sign_in_redirects_to_resources() {
		let f = fixture();
		let credentials = Credentials::new("alice@example.com", "secret1");
		let identity = f.session.sign_up(&credentials).await.unwrap();

		let receipt = f.session.submit(form("alice")).await.unwrap();
		let order = f
			.repository
			.get_by_id(receipt.order_id)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(order.auth_identity.as_deref(), Some(identity.id.as_str()));
		f.repository
			.update_status(receipt.order_id, OrderStatus::Approved)
			.await
			.unwrap();

		f.session.sign_out().await.unwrap();
		assert!(f.session.resolver().resolve().await.is_empty());

		assert_eq!(
			f.session.sign_in(&credentials).await.unwrap(),
			EntryRoute::Resources { grant: GRANT }
		);
	}

	#[tokio::test]
	async fn test_failed_submission_remembers_nothing() {
		let f = fixture();
		let mut incomplete = form("alice");
		incomplete.artifact = None;

		assert!(matches!(
			f.session.submit(incomplete).await,
			Err(WorkflowError::Validation(_))
		));
		assert!(f.session.resolver().resolve().await.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_watch_reports_pending_then_rejection() {
		let f = fixture();
		let receipt = f.session.submit(form("bob")).await.unwrap();
		let (handle, mut signals) = f
			.session
			.watch(CancellationToken::new())
			.await
			.unwrap();

		match signals.recv().await {
			Some(SyncSignal::AwaitingReview {
				order_id,
				preview_url,
			}) => {
				assert_eq!(order_id, receipt.order_id);
				assert!(preview_url.is_some());
			},
			other => panic!("unexpected signal {:?}", other),
		}

		f.repository
			.update_status(receipt.order_id, OrderStatus::Rejected)
			.await
			.unwrap();
		assert_eq!(
			signals.recv().await,
			Some(SyncSignal::Rejected {
				order_id: receipt.order_id
			})
		);
		assert_eq!(
			handle.join().await,
			SyncOutcome::Rejected {
				order_id: receipt.order_id
			}
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_sign_in_while_watching_follows_the_account_order() {
		let f = fixture();
		let credentials = Credentials::new("alice@example.com", "secret1");
		let provider = f.session.resolver().provider().clone();
		let identity = provider.sign_up(&credentials).await.unwrap();
		provider.sign_out().await.unwrap();

		// Filed from another device under the account, with another handle.
		let account_order = f
			.repository
			.insert(NewOrder {
				university_id: 3,
				department_id: 7,
				full_name: "Alice Example".into(),
				requester_handle: "alice-laptop".into(),
				auth_identity: Some(identity.id.clone()),
				artifact_path: None,
			})
			.await
			.unwrap();
		let handle_order = f.session.submit(form("alice")).await.unwrap().order_id;

		let (handle, mut signals) = f
			.session
			.watch(CancellationToken::new())
			.await
			.unwrap();
		assert!(matches!(
			signals.recv().await,
			Some(SyncSignal::AwaitingReview { order_id, .. }) if order_id == handle_order
		));

		f.session.sign_in(&credentials).await.unwrap();
		assert!(matches!(
			signals.recv().await,
			Some(SyncSignal::AwaitingReview { order_id, .. }) if order_id == account_order
		));

		f.repository
			.update_status(account_order, OrderStatus::Approved)
			.await
			.unwrap();
		assert_eq!(
			signals.recv().await,
			Some(SyncSignal::Approved {
				order_id: account_order,
				grant: GRANT
			})
		);
		assert_eq!(
			handle.join().await,
			SyncOutcome::Approved {
				order_id: account_order,
				grant: GRANT
			}
		);
	}
}
