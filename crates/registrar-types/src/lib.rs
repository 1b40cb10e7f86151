//! Common types module for the registrar system.
//!
//! This module defines the data model shared by every registrar component:
//! registration orders and their review status, identity keys, the read-only
//! catalog, synchronizer signals, storage namespaces and API shapes.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// University and department catalog entities.
pub mod catalog;
/// Workflow error taxonomy shared across components.
pub mod error;
/// Signals emitted towards the requester while an order is being reviewed.
pub mod events;
/// Requester identity types.
pub mod identity;
/// Registration orders, review decisions and access grants.
pub mod order;
/// Registry trait for self-registering implementations.
pub mod registry;
/// Secret string wrapper for signing keys, tokens and passwords.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Utility helpers for timestamps and log formatting.
pub mod utils;
/// Configuration validation types for backend configuration tables.
pub mod validation;

pub use api::*;
pub use catalog::*;
pub use error::*;
pub use events::*;
pub use identity::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp, current_timestamp_millis, truncate_id};
pub use validation::*;
