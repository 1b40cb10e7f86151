//! Formatting helpers for log output.

/// Shortens free text (handles, storage paths, identity ids) for logs.
///
/// Keeps the first 8 characters followed by ".." for longer strings. Works on
/// character boundaries, so multi-byte handles are never split.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((cut, _)) => format!("{}..", &id[..cut]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("alice"), "alice");
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
		assert_eq!(truncate_id("ሰላምሰላምሰላም"), "ሰላምሰላምሰላ..");
	}
}
