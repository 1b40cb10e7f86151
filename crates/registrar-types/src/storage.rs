//! Storage namespaces used by the registrar.

use std::str::FromStr;

/// Namespaces for key/value storage.
///
/// Replaces string literals in storage calls with typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order rows keyed by id.
	Orders,
	/// Monotonic order id counter.
	OrderSequence,
	/// Ids of every stored order, for listing.
	OrderIndex,
	/// Order ids per requester handle.
	OrdersByHandle,
	/// Order ids per identity provider id.
	OrdersByAuth,
	/// The locally remembered requester handle.
	RememberedHandle,
}

impl StorageKey {
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderSequence => "order_sequence",
			StorageKey::OrderIndex => "order_index",
			StorageKey::OrdersByHandle => "orders_by_handle",
			StorageKey::OrdersByAuth => "orders_by_auth",
			StorageKey::RememberedHandle => "remembered_handle",
		}
	}

	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Orders,
			Self::OrderSequence,
			Self::OrderIndex,
			Self::OrdersByHandle,
			Self::OrdersByAuth,
			Self::RememberedHandle,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
