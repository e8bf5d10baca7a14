//! Cached key-set payload and lifecycle states.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::_prelude::*;

/// Key set together with the metadata of the fetch that produced it.
///
/// Always replaced as a whole, so the keys and their timestamps can never disagree.
#[derive(Clone, Debug)]
pub struct CachedKeySet {
	/// JWKS document retained for the issuer.
	pub keys: Arc<JwkSet>,
	/// Endpoint the keys were fetched from.
	pub jwks_uri: Url,
	/// Monotonic instant at which the fetch completed.
	pub fetched_at: Instant,
	/// Wall-clock counterpart of `fetched_at`.
	pub fetched_at_wallclock: DateTime<Utc>,
	/// Freshness window starting at `fetched_at`.
	pub ttl: Duration,
}
impl CachedKeySet {
	/// Whether `now - fetched_at < ttl`.
	pub fn is_fresh(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.fetched_at) < self.ttl
	}

	/// Wall-clock instant at which the payload turns stale.
	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		TimeDelta::from_std(self.ttl)
			.ok()
			.and_then(|ttl| self.fetched_at_wallclock.checked_add_signed(ttl))
	}

	/// Key identifiers in document order.
	pub fn key_ids(&self) -> Vec<String> {
		self.keys.keys.iter().filter_map(|jwk| jwk.common.key_id.clone()).collect()
	}
}

/// Cache lifecycle states.
#[derive(Clone, Debug, Default)]
pub enum CacheState {
	/// No key set has been fetched successfully yet.
	#[default]
	Empty,
	/// A key set is available (fresh or stale).
	Ready(CachedKeySet),
}
impl CacheState {
	/// Retrieve the current payload if available.
	pub fn payload(&self) -> Option<&CachedKeySet> {
		match self {
			CacheState::Ready(payload) => Some(payload),
			CacheState::Empty => None,
		}
	}
}
