//! HTTP handlers, one module per resource.

pub mod admin;
pub mod artifacts;
pub mod catalog;
pub mod orders;
