//! Approval synchronizer.
//!
//! Polls the latest order of the current requester on a fixed interval and
//! turns what it sees into [`SyncSignal`]s. The first poll happens as soon as
//! the loop starts. Polls never overlap, a failed or timed-out poll is
//! retried on the next tick, and the loop ends on the first terminal status
//! or as soon as it is cancelled. Once the loop has observed cancellation it
//! emits nothing more; a signal already on its way may still be delivered.
//!
//! [`ApprovalSynchronizer::follow`] keeps a run keyed on the requester's
//! current identity: signing in or out mid-run restarts polling with the
//! newly resolved keys.

use super::OrderSource;
use registrar_config::SyncConfig;
use registrar_identity::{describe_keys, IdentityResolver};
use registrar_types::{
	AccessGrant, IdentityKey, Order, OrderId, OrderStatus, OrderView, SyncSignal, WorkflowError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// How a synchronizer run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
	Approved { order_id: OrderId, grant: AccessGrant },
	Rejected { order_id: OrderId },
	/// Stopped before reaching a terminal status.
	Cancelled,
	/// There was no identity key to poll for.
	NoIdentity,
}

pub struct ApprovalSynchronizer {
	source: Arc<dyn OrderSource>,
	poll_interval: Duration,
	request_timeout: Duration,
}

impl ApprovalSynchronizer {
	pub fn new(source: Arc<dyn OrderSource>, poll_interval: Duration, request_timeout: Duration) -> Self {
		Self {
			source,
			poll_interval,
			request_timeout,
		}
	}

	pub fn from_config(source: Arc<dyn OrderSource>, config: &SyncConfig) -> Self {
		Self::new(
			source,
			Duration::from_secs(config.poll_interval_seconds),
			Duration::from_secs(config.request_timeout_seconds),
		)
	}

	pub fn poll_interval(&self) -> Duration {
		self.poll_interval
	}

	/// Latest order of the first key, in rank order, that has one.
	pub async fn poll_once(&self, keys: &[IdentityKey]) -> Result<Option<OrderView>, WorkflowError> {
		for key in keys {
			if let Some(view) = self.source.latest_for(key).await? {
				return Ok(Some(view));
			}
		}
		Ok(None)
	}

	/// Runs the polling loop until a terminal status, cancellation, or the
	/// receiver of `signals` going away.
	///
	/// "Awaiting review" is emitted once per pending order; terminal signals
	/// are emitted exactly once, as the last signal of the run.
	#[instrument(skip_all, fields(keys = %describe_keys(&keys)))]
	pub async fn run(
		&self,
		keys: Vec<IdentityKey>,
		signals: mpsc::UnboundedSender<SyncSignal>,
		cancel: CancellationToken,
	) -> SyncOutcome {
		if keys.is_empty() {
			debug!("No identity to synchronize");
			return SyncOutcome::NoIdentity;
		}

		let mut ticker = interval(self.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		let mut awaiting: Option<OrderId> = None;

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				_ = ticker.tick() => {},
			}

			let polled = tokio::select! {
				biased;
				_ = cancel.cancelled() => break,
				polled = timeout(self.request_timeout, self.poll_once(&keys)) => polled,
			};

			let (signal, outcome) = match polled {
				Ok(Ok(None)) => continue,
				Ok(Ok(Some(view))) => {
					let (signal, outcome) = observe(&view.order, view.preview_url);
					if let SyncSignal::AwaitingReview { order_id, .. } = &signal {
						if awaiting == Some(*order_id) {
							continue;
						}
						awaiting = Some(*order_id);
					}
					(signal, outcome)
				},
				Ok(Err(e)) => {
					warn!(error = %e, "Poll failed, retrying on next tick");
					(SyncSignal::Degraded { reason: e.to_string() }, None)
				},
				Err(_) => {
					warn!(timeout_secs = self.request_timeout.as_secs(), "Poll timed out, retrying on next tick");
					(
						SyncSignal::Degraded {
							reason: format!(
								"poll timed out after {}s",
								self.request_timeout.as_secs()
							),
						},
						None,
					)
				},
			};

			// The consumer may have gone away while the poll was in flight.
			if cancel.is_cancelled() {
				break;
			}
			if signals.send(signal).is_err() {
				debug!("Signal receiver dropped");
				break;
			}
			if let Some(outcome) = outcome {
				info!(?outcome, "Synchronizer finished");
				return outcome;
			}
		}

		debug!("Synchronizer cancelled");
		SyncOutcome::Cancelled
	}

	/// Like [`run`](Self::run), but keyed on whatever `resolver` currently
	/// resolves to.
	///
	/// Every change of the authenticated identity re-resolves the keys; if
	/// they differ, the current run is stopped and a new one started, which
	/// reports the latest order for the new keys afresh. While no key
	/// resolves the loop idles until the next change.
	#[instrument(skip_all)]
	pub async fn follow(
		&self,
		resolver: &IdentityResolver,
		signals: mpsc::UnboundedSender<SyncSignal>,
		cancel: CancellationToken,
	) -> SyncOutcome {
		let mut changes = resolver.changes();
		let mut keys = resolver.resolve().await;
		if keys.is_empty() {
			debug!("No identity to synchronize");
			return SyncOutcome::NoIdentity;
		}

		loop {
			if cancel.is_cancelled() {
				return SyncOutcome::Cancelled;
			}
			if keys.is_empty() {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => return SyncOutcome::Cancelled,
					changed = changes.changed() => {
						if changed.is_err() {
							return SyncOutcome::NoIdentity;
						}
						keys = resolver.resolve().await;
						continue;
					}
				}
			}

			let run_cancel = cancel.child_token();
			let run = self.run(keys.clone(), signals.clone(), run_cancel.clone());
			tokio::pin!(run);

			keys = loop {
				tokio::select! {
					outcome = &mut run => return outcome,
					changed = changes.changed() => {
						if changed.is_err() {
							// Identity can no longer change.
							return run.as_mut().await;
						}
						let next = resolver.resolve().await;
						if next == keys {
							continue;
						}
						info!(keys = %describe_keys(&next), "Identity changed, restarting synchronizer");
						run_cancel.cancel();
						match run.as_mut().await {
							SyncOutcome::Cancelled => break next,
							outcome => return outcome,
						}
					}
				}
			};
		}
	}

	/// Starts [`run`](Self::run) on a new task.
	pub fn spawn(
		self: &Arc<Self>,
		keys: Vec<IdentityKey>,
		cancel: CancellationToken,
	) -> (SyncHandle, mpsc::UnboundedReceiver<SyncSignal>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let synchronizer = Arc::clone(self);
		let token = cancel.clone();
		let join = tokio::spawn(async move { synchronizer.run(keys, tx, token).await });
		(SyncHandle { cancel, join }, rx)
	}

	/// Starts [`follow`](Self::follow) on a new task.
	pub fn spawn_following(
		self: &Arc<Self>,
		resolver: Arc<IdentityResolver>,
		cancel: CancellationToken,
	) -> (SyncHandle, mpsc::UnboundedReceiver<SyncSignal>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let synchronizer = Arc::clone(self);
		let token = cancel.clone();
		let join =
			tokio::spawn(async move { synchronizer.follow(&resolver, tx, token).await });
		(SyncHandle { cancel, join }, rx)
	}
}

/// Signal for an observed order, plus the outcome if it is terminal.
fn observe(order: &Order, preview_url: Option<String>) -> (SyncSignal, Option<SyncOutcome>) {
	let order_id = order.id;
	match (order.status, order.access_grant()) {
		(_, Some(grant)) => (
			SyncSignal::Approved { order_id, grant },
			Some(SyncOutcome::Approved { order_id, grant }),
		),
		(OrderStatus::Rejected, _) => (
			SyncSignal::Rejected { order_id },
			Some(SyncOutcome::Rejected { order_id }),
		),
		_ => (
			SyncSignal::AwaitingReview {
				order_id,
				preview_url,
			},
			None,
		),
	}
}

/// Handle of a spawned synchronizer.
pub struct SyncHandle {
	cancel: CancellationToken,
	join: JoinHandle<SyncOutcome>,
}

impl SyncHandle {
	/// Requests the loop to stop.
	///
	/// A signal the loop was already sending may still arrive after this
	/// returns. Consumers that must not see it should drop the receiver, or
	/// use [`stop`](Self::stop), after which nothing more is sent.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}

	/// Waits for the loop to end.
	pub async fn join(self) -> SyncOutcome {
		match self.join.await {
			Ok(outcome) => outcome,
			Err(e) => {
				error!(error = %e, "Synchronizer task failed");
				SyncOutcome::Cancelled
			},
		}
	}

	/// Cancels the loop and waits for it to end. The signal channel is
	/// closed once this returns.
	pub async fn stop(self) -> SyncOutcome {
		self.cancel();
		self.join().await
	}
}
