//! Requester-side synchronization with review decisions.
//!
//! There is no push channel: the [`ApprovalSynchronizer`] polls an
//! [`OrderSource`] and reports what changed.

mod source;
mod synchronizer;

#[cfg(test)]
pub use source::MockOrderSource;
pub use source::{OrderSource, RepositoryOrderSource};
pub use synchronizer::{ApprovalSynchronizer, SyncHandle, SyncOutcome};
