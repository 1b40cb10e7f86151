//! Request handlers for the registration workflow.
//!
//! Submission turns a requester's form into a pending order; review lets an
//! administrator settle it.

pub mod review;
pub mod submission;

pub use review::{AdminReviewer, ReviewError};
pub use submission::{
	ArtifactFile, OrderSubmitter, SubmissionError, SubmissionForm, SubmissionHandler,
	SubmissionPolicy, SubmissionReceipt,
};
