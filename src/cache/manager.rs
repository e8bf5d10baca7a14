//! Cache manager handling JWKS retrieval and lifecycle.

// crates.io
use jsonwebtoken::jwk::JwkSet;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
// self
use crate::{
	_prelude::*,
	cache::{
		entry::{CacheEntry, RefreshFailure, RefreshStage},
		state::CachedKeySet,
	},
	config::{GateConfig, JwksSource},
	http::{client::Fetcher, discovery::DiscoveryResolver},
	metrics::{self, CacheMetrics, CacheMetricsSnapshot},
};

/// Owns the issuer's key set and coordinates refreshes.
///
/// Refreshes are single-flight: the mutex admits one upstream fetch at a time, and callers that
/// queued behind a refresh which completed while they waited reuse its outcome. The entry lock is
/// never held across network I/O.
#[derive(Clone, Debug)]
pub struct JwksCache {
	issuer: Arc<str>,
	endpoint: Arc<Endpoint>,
	ttl: Duration,
	fetcher: Fetcher,
	discovery: DiscoveryResolver,
	entry: Arc<RwLock<CacheEntry>>,
	single_flight: Arc<Mutex<()>>,
	metrics: Arc<CacheMetrics>,
}
impl JwksCache {
	/// Build a cache with the default reqwest client.
	pub fn new(config: &GateConfig) -> Result<Self> {
		config.validate()?;

		let fetcher = Fetcher::new(config)?;

		Self::with_fetcher(config, fetcher)
	}

	/// Build a cache using the supplied HTTP client (primarily for tests).
	pub fn with_client(config: &GateConfig, client: Client) -> Result<Self> {
		config.validate()?;

		Self::with_fetcher(config, Fetcher::with_client(config, client))
	}

	fn with_fetcher(config: &GateConfig, fetcher: Fetcher) -> Result<Self> {
		let endpoint = match &config.jwks_source {
			JwksSource::Discovery => Endpoint::Discovery(config.discovery_url()?),
			JwksSource::Fixed { url } => Endpoint::Fixed(url.clone()),
		};
		let issuer: Arc<str> = Arc::from(config.issuer.as_str());

		Ok(Self {
			entry: Arc::new(RwLock::new(CacheEntry::new(issuer.clone()))),
			issuer,
			endpoint: Arc::new(endpoint),
			ttl: config.cache_ttl,
			discovery: DiscoveryResolver::new(fetcher.clone()),
			fetcher,
			single_flight: Arc::new(Mutex::new(())),
			metrics: CacheMetrics::new(),
		})
	}

	/// Issuer the cache serves keys for.
	pub fn issuer(&self) -> &str {
		&self.issuer
	}

	/// Access the per-cache metrics accumulator.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Return the current key set.
	///
	/// Without `force`, a fresh cached set is returned without I/O. Otherwise (or when empty or
	/// stale) the set is refreshed from upstream. On failure the previous set stays cached and
	/// the error is returned to this caller only.
	pub async fn get_keys(&self, force: bool) -> Result<Arc<JwkSet>> {
		Ok(self.lookup(force).await?.keys)
	}

	/// Same as [`JwksCache::get_keys`], also reporting whether this call went upstream.
	#[tracing::instrument(skip(self), fields(issuer = %self.issuer))]
	pub async fn lookup(&self, force: bool) -> Result<KeyLookup> {
		let (snapshot, attempt) = {
			let entry = self.entry.read().await;

			(entry.snapshot(), entry.attempt())
		};

		if !force
			&& let Some(payload) = snapshot
			&& payload.is_fresh(Instant::now())
		{
			self.observe_lookup(true);

			return Ok(KeyLookup { keys: payload.keys, refreshed: false });
		}

		self.observe_lookup(false);

		if force {
			self.observe_forced_refresh();
		}

		let keys = self.refresh(attempt).await?;

		Ok(KeyLookup { keys, refreshed: true })
	}

	/// Capture the current cache state for status reporting.
	pub async fn status(&self) -> CacheStatus {
		let refresh_in_flight = self.single_flight.try_lock().is_err();
		let entry = { self.entry.read().await.clone() };
		let now = Instant::now();
		let payload = entry.snapshot();
		let state = match &payload {
			None => CacheFreshness::Empty,
			Some(payload) if payload.is_fresh(now) => CacheFreshness::Fresh,
			Some(_) => CacheFreshness::Stale,
		};

		CacheStatus {
			issuer: self.issuer.to_string(),
			state,
			jwks_uri: payload.as_ref().map(|payload| payload.jwks_uri.clone()),
			key_ids: payload.as_ref().map(CachedKeySet::key_ids).unwrap_or_default(),
			last_refresh: payload.as_ref().map(|payload| payload.fetched_at_wallclock),
			expires_at: payload.as_ref().and_then(CachedKeySet::expires_at),
			consecutive_failures: entry.consecutive_failures(),
			last_error: entry.last_failure().map(|failure| failure.to_error().to_string()),
			refresh_in_flight,
			metrics: self.metrics.snapshot(),
		}
	}

	#[tracing::instrument(skip(self), fields(issuer = %self.issuer))]
	async fn refresh(&self, observed_attempt: u64) -> Result<Arc<JwkSet>> {
		let _guard = self.single_flight.lock().await;

		{
			let entry = self.entry.read().await;

			if entry.attempt() != observed_attempt
				&& let Some(outcome) = entry.last_outcome()
			{
				tracing::debug!("reusing outcome of a refresh completed while queued");

				self.observe_coalesced();

				return outcome;
			}
		}

		let started = Instant::now();

		match self.fetch().await {
			Ok((jwks_uri, keys)) => {
				let keys = Arc::new(keys);
				let payload = CachedKeySet {
					keys: keys.clone(),
					jwks_uri,
					fetched_at: Instant::now(),
					fetched_at_wallclock: Utc::now(),
					ttl: self.ttl,
				};

				tracing::info!(
					jwks_uri = %payload.jwks_uri,
					keys = keys.keys.len(),
					"jwks refreshed"
				);

				self.entry.write().await.record_success(payload);
				self.observe_refresh_success(started.elapsed());

				Ok(keys)
			},
			Err(failure) => {
				let err = failure.to_error();

				tracing::warn!(error = %err, "jwks refresh failed; previous key set retained");

				self.observe_refresh_error(failure.stage);
				self.entry.write().await.record_failure(failure);

				Err(err)
			},
		}
	}

	async fn fetch(&self) -> std::result::Result<(Url, JwkSet), RefreshFailure> {
		let jwks_uri = match &*self.endpoint {
			Endpoint::Fixed(url) => url.clone(),
			Endpoint::Discovery(url) => self
				.discovery
				.fetch_jwks_uri(&self.issuer, url)
				.await
				.map_err(|err| RefreshFailure {
					stage: RefreshStage::Discovery,
					url: url.clone(),
					source: Arc::new(err),
				})?,
		};
		let keys = self.fetcher.fetch_jwks(&jwks_uri).await.map_err(|err| RefreshFailure {
			stage: RefreshStage::Jwks,
			url: jwks_uri.clone(),
			source: Arc::new(err),
		})?;

		Ok((jwks_uri, keys))
	}

	fn observe_lookup(&self, hit: bool) {
		metrics::record_lookup(&self.issuer, hit);

		self.metrics.record_lookup(hit);
	}

	fn observe_forced_refresh(&self) {
		metrics::record_forced_refresh(&self.issuer);

		self.metrics.record_forced_refresh();
	}

	fn observe_coalesced(&self) {
		metrics::record_coalesced(&self.issuer);

		self.metrics.record_coalesced();
	}

	fn observe_refresh_success(&self, duration: Duration) {
		metrics::record_refresh_success(&self.issuer, duration);

		self.metrics.record_refresh_success(duration);
	}

	fn observe_refresh_error(&self, stage: RefreshStage) {
		metrics::record_refresh_error(&self.issuer, stage.as_str());

		self.metrics.record_refresh_error();
	}
}

/// Outcome of [`JwksCache::lookup`].
#[derive(Clone, Debug)]
pub struct KeyLookup {
	/// Current key set.
	pub keys: Arc<JwkSet>,
	/// Set was fetched during this call, or taken from a refresh that finished while it queued.
	pub refreshed: bool,
}

/// Freshness of the cached key set at status time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum CacheFreshness {
	/// Nothing fetched yet.
	Empty,
	/// Within the TTL window.
	Fresh,
	/// Past the TTL; the next lookup refreshes.
	Stale,
}

/// Status projection of a [`JwksCache`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheStatus {
	/// Issuer served by the cache.
	pub issuer: String,
	/// Freshness of the cached key set.
	pub state: CacheFreshness,
	/// Endpoint the current key set came from.
	pub jwks_uri: Option<Url>,
	/// Key identifiers in the current set.
	pub key_ids: Vec<String>,
	/// Timestamp of the most recent successful refresh.
	pub last_refresh: Option<DateTime<Utc>>,
	/// When the current set turns stale.
	pub expires_at: Option<DateTime<Utc>>,
	/// Failed refreshes since the last success.
	pub consecutive_failures: u32,
	/// Description of the most recent failure, if the last attempt failed.
	pub last_error: Option<String>,
	/// Whether a refresh currently holds the single-flight guard.
	pub refresh_in_flight: bool,
	/// Counter snapshot.
	pub metrics: CacheMetricsSnapshot,
}

#[derive(Debug)]
enum Endpoint {
	Discovery(Url),
	Fixed(Url),
}
