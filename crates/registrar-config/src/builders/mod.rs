//! Configuration builders for tests and local development.

mod config;

pub use config::ConfigBuilder;
