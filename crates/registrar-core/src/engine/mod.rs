//! Registrar engine.
//!
//! Owns the configured services and the workflow components built on top of
//! them, and runs background maintenance until shutdown.

pub mod lifecycle;

use crate::builder::IdentityComponents;
use crate::handlers::{AdminReviewer, SubmissionHandler, SubmissionPolicy};
use crate::session::RequesterSession;
use crate::state::OrderStateMachine;
use crate::sync::{ApprovalSynchronizer, RepositoryOrderSource};
use registrar_blob::ArtifactAccessIssuer;
use registrar_config::Config;
use registrar_identity::IdentityResolver;
use registrar_orders::{OrderRepository, StoredOrderRepository};
use registrar_storage::StorageService;
use registrar_types::Catalog;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Main registrar engine.
#[derive(Clone)]
pub struct RegistrarEngine {
	/// Registrar configuration.
	pub(crate) config: Config,
	/// Storage service for orders.
	pub(crate) storage: Arc<StorageService>,
	/// Storage service for remembered handles.
	pub(crate) handle_storage: Arc<StorageService>,
	pub(crate) repository: Arc<dyn OrderRepository>,
	pub(crate) issuer: Arc<ArtifactAccessIssuer>,
	pub(crate) submissions: Arc<SubmissionHandler>,
	pub(crate) reviewer: Arc<AdminReviewer>,
	/// Polls the repository, attaching evidence previews.
	pub(crate) synchronizer: Arc<ApprovalSynchronizer>,
	pub(crate) resolver: Arc<IdentityResolver>,
	/// Cancelled when the engine shuts down.
	pub(crate) cancel: CancellationToken,
}

impl RegistrarEngine {
	/// Wires the workflow components on top of the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		issuer: Arc<ArtifactAccessIssuer>,
		identity: IdentityComponents,
	) -> Self {
		let repository: Arc<dyn OrderRepository> =
			Arc::new(StoredOrderRepository::new(storage.clone()));
		let state_machine = Arc::new(OrderStateMachine::new(repository.clone()));
		let preview_ttl = Duration::from_secs(config.blob.preview_ttl_seconds);

		let submissions = Arc::new(SubmissionHandler::new(
			repository.clone(),
			issuer.clone(),
			config.catalog.clone(),
			SubmissionPolicy {
				require_artifact: config.blob.require_artifact,
				max_artifact_bytes: config.blob.max_artifact_bytes,
				preview_ttl,
			},
		));

		let reviewer = Arc::new(AdminReviewer::new(
			state_machine,
			repository.clone(),
			issuer.clone(),
			preview_ttl,
		));

		let order_source = Arc::new(
			RepositoryOrderSource::new(repository.clone()).with_previews(issuer.clone(), preview_ttl),
		);
		let synchronizer = Arc::new(ApprovalSynchronizer::from_config(order_source, &config.sync));

		Self {
			config,
			storage,
			handle_storage: identity.handle_storage,
			repository,
			issuer,
			submissions,
			reviewer,
			synchronizer,
			resolver: identity.resolver,
			cancel: CancellationToken::new(),
		}
	}

	/// Runs background maintenance until Ctrl-C or [`stop`](Self::stop).
	pub async fn run(&self) -> Result<(), EngineError> {
		self.initialize().await?;

		let interval = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		let mut cleanup = vec![spawn_cleanup("storage", self.storage.clone(), interval)];
		if !Arc::ptr_eq(&self.storage, &self.handle_storage) {
			cleanup.push(spawn_cleanup(
				"handle_store",
				self.handle_storage.clone(),
				interval,
			));
		}

		tokio::select! {
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("Received shutdown signal");
			}
			_ = self.cancel.cancelled() => {}
		}

		for handle in cleanup {
			handle.abort();
		}
		self.shutdown().await
	}

	/// Asks a running engine to stop.
	pub fn stop(&self) {
		self.cancel.cancel();
	}

	/// Token cancelled on shutdown; synchronizers started through the engine
	/// should use a child of it.
	pub fn shutdown_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn catalog(&self) -> &Catalog {
		&self.config.catalog
	}

	pub fn repository(&self) -> &Arc<dyn OrderRepository> {
		&self.repository
	}

	pub fn issuer(&self) -> &Arc<ArtifactAccessIssuer> {
		&self.issuer
	}

	pub fn submissions(&self) -> &Arc<SubmissionHandler> {
		&self.submissions
	}

	pub fn reviewer(&self) -> &Arc<AdminReviewer> {
		&self.reviewer
	}

	pub fn synchronizer(&self) -> &Arc<ApprovalSynchronizer> {
		&self.synchronizer
	}

	/// An in-process requester session over this engine's components, for
	/// clients that share the engine's stores instead of going through the
	/// HTTP API.
	pub fn session(&self) -> RequesterSession {
		RequesterSession::new(
			self.resolver.clone(),
			self.submissions.clone(),
			self.synchronizer.clone(),
		)
	}
}

fn spawn_cleanup(
	component: &'static str,
	storage: Arc<StorageService>,
	period: Duration,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut interval = tokio::time::interval(period);
		loop {
			interval.tick().await;
			match storage.cleanup_expired().await {
				Ok(count) if count > 0 => {
					tracing::debug!(component, "Storage cleanup: removed {} expired entries", count);
				},
				Err(e) => {
					tracing::warn!(component, "Storage cleanup failed: {}", e);
				},
				_ => {}, // No expired entries
			}
		}
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::builder::{builtin_factories, RegistrarBuilder};
	use crate::handlers::{ArtifactFile, SubmissionForm};
	use crate::sync::SyncOutcome;
	use registrar_config::ConfigBuilder;
	use registrar_types::{AccessGrant, EntryRoute, ReviewDecision, SyncSignal};

	fn engine() -> RegistrarEngine {
		RegistrarBuilder::new(ConfigBuilder::new().build())
			.build(builtin_factories())
			.unwrap()
	}

	fn form() -> SubmissionForm {
		SubmissionForm {
			university_id: Some(3),
			department_id: Some(7),
			full_name: "Alice Example".into(),
			requester_handle: "alice".into(),
			auth_identity: None,
			artifact: Some(ArtifactFile {
				file_name: "payment.png".into(),
				bytes: b"png".to_vec(),
			}),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_submission_review_and_sync() {
		let engine = engine();
		let session = engine.session();

		let receipt = session.submit(form()).await.unwrap();
		assert!(receipt.preview_url.is_some());

		let (handle, mut signals) = session
			.watch(engine.shutdown_token().child_token())
			.await
			.unwrap();
		assert!(matches!(
			signals.recv().await,
			Some(SyncSignal::AwaitingReview { .. })
		));

		let admin_view = engine.reviewer().artifact_url(receipt.order_id).await.unwrap();
		assert!(admin_view.url.contains("/artifacts/screenshot/alice-"));
		engine
			.reviewer()
			.review(receipt.order_id, ReviewDecision::Approve)
			.await
			.unwrap();

		let grant = AccessGrant {
			university_id: 3,
			department_id: 7,
		};
		assert_eq!(
			handle.join().await,
			SyncOutcome::Approved {
				order_id: receipt.order_id,
				grant
			}
		);
		assert_eq!(session.entry_route().await, EntryRoute::Resources { grant });
	}

	#[tokio::test]
	async fn test_stop_ends_run_and_cancels_watchers() {
		let engine = engine();
		engine.session().submit(form()).await.unwrap();
		let (handle, _signals) = engine
			.session()
			.watch(engine.shutdown_token().child_token())
			.await
			.unwrap();

		let runner = engine.clone();
		let run = tokio::spawn(async move { runner.run().await });
		engine.stop();

		assert!(run.await.unwrap().is_ok());
		assert_eq!(handle.join().await, SyncOutcome::Cancelled);
	}
}
