//! State management for registration orders.

pub mod order;

pub use order::{OrderStateMachine, StateError, TransitionOutcome};
