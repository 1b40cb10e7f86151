//! Small helpers shared by every registrar crate.

pub mod formatting;
pub mod time;

pub use formatting::truncate_id;
pub use time::{current_timestamp, current_timestamp_millis};
