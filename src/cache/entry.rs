//! Cache entry definitions and state management helpers.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::{
	_prelude::*,
	cache::state::{CacheState, CachedKeySet},
	error::UpstreamError,
};

/// Step of a refresh that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshStage {
	/// Discovery document fetch.
	Discovery,
	/// JWKS document fetch.
	Jwks,
}
impl RefreshStage {
	/// Metric label for the stage.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Discovery => "discovery",
			Self::Jwks => "jwks",
		}
	}
}

/// Failure of the most recent refresh, retained so queued callers can share it.
#[derive(Clone, Debug)]
pub struct RefreshFailure {
	/// Failing step.
	pub stage: RefreshStage,
	/// Endpoint that was queried.
	pub url: Url,
	/// Upstream cause.
	pub source: Arc<UpstreamError>,
}
impl RefreshFailure {
	/// Convert into the crate error for the failing stage.
	pub fn to_error(&self) -> Error {
		match self.stage {
			RefreshStage::Discovery =>
				Error::Discovery { url: self.url.clone(), source: self.source.clone() },
			RefreshStage::Jwks =>
				Error::JwksFetch { url: self.url.clone(), source: self.source.clone() },
		}
	}
}

/// Mutable cache cell for one issuer.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	issuer: Arc<str>,
	state: CacheState,
	attempt: u64,
	consecutive_failures: u32,
	last_failure: Option<RefreshFailure>,
}
impl CacheEntry {
	/// Create a new empty cache entry.
	pub fn new(issuer: impl Into<Arc<str>>) -> Self {
		Self {
			issuer: issuer.into(),
			state: CacheState::Empty,
			attempt: 0,
			consecutive_failures: 0,
			last_failure: None,
		}
	}

	/// Issuer this entry caches keys for.
	pub fn issuer(&self) -> &str {
		&self.issuer
	}

	/// Inspect the current cache state.
	pub fn state(&self) -> &CacheState {
		&self.state
	}

	/// Number of completed refresh attempts; bumps on success and failure alike.
	pub fn attempt(&self) -> u64 {
		self.attempt
	}

	/// Consecutive failed refreshes since the last success.
	pub fn consecutive_failures(&self) -> u32 {
		self.consecutive_failures
	}

	/// Failure of the most recent attempt, if it failed.
	pub fn last_failure(&self) -> Option<&RefreshFailure> {
		self.last_failure.as_ref()
	}

	/// Retrieve a clone of the cached payload if present.
	pub fn snapshot(&self) -> Option<CachedKeySet> {
		self.state.payload().cloned()
	}

	/// Install a freshly fetched key set.
	pub fn record_success(&mut self, payload: CachedKeySet) {
		self.state = CacheState::Ready(payload);
		self.attempt = self.attempt.wrapping_add(1);
		self.consecutive_failures = 0;
		self.last_failure = None;
	}

	/// Record a failed refresh; the previous key set, if any, stays in place.
	pub fn record_failure(&mut self, failure: RefreshFailure) {
		self.attempt = self.attempt.wrapping_add(1);
		self.consecutive_failures = self.consecutive_failures.saturating_add(1);
		self.last_failure = Some(failure);
	}

	/// Outcome of the most recent attempt, as handed to callers that queued behind it.
	pub fn last_outcome(&self) -> Option<Result<Arc<JwkSet>>> {
		if let Some(failure) = &self.last_failure {
			return Some(Err(failure.to_error()));
		}

		self.state.payload().map(|payload| Ok(payload.keys.clone()))
	}
}
