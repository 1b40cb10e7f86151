//! Core of the registration approval workflow.
//!
//! Requesters submit a paid-registration order together with their payment
//! evidence; an administrator approves or rejects it; the requester's client
//! polls until the decision is visible and then either unlocks the
//! registered resources or shows the rejection.
//!
//! - [`state`]: the order state machine (`pending` to `approved` or
//!   `rejected`, once).
//! - [`handlers`]: submission and administrator review.
//! - [`sync`]: the approval synchronizer and the order sources it polls.
//! - [`session`]: one requester's view of the workflow.
//! - [`engine`] and [`builder`]: wiring from configuration and background
//!   maintenance.

pub mod builder;
pub mod engine;
pub mod handlers;
pub mod session;
pub mod state;
pub mod sync;

pub use builder::{BuilderError, IdentityComponents, RegistrarBuilder, RegistrarFactories};
pub use engine::{EngineError, RegistrarEngine};
pub use session::RequesterSession;
