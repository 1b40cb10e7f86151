use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix time in seconds. A clock before the epoch reads as zero.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Current Unix time in milliseconds.
pub fn current_timestamp_millis() -> u128 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis())
		.unwrap_or(0)
}
