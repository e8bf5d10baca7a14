//! Metrics helpers and per-cache telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_LOOKUPS_TOTAL: &str = "realm_gate_jwks_lookups_total";
const METRIC_HITS_TOTAL: &str = "realm_gate_jwks_hits_total";
const METRIC_REFRESH_TOTAL: &str = "realm_gate_jwks_refresh_total";
const METRIC_REFRESH_DURATION: &str = "realm_gate_jwks_refresh_duration_seconds";
const METRIC_FORCED_REFRESH_TOTAL: &str = "realm_gate_jwks_forced_refresh_total";
const METRIC_COALESCED_TOTAL: &str = "realm_gate_jwks_coalesced_total";
const METRIC_DECISIONS_TOTAL: &str = "realm_gate_decisions_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for one JWKS cache.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	lookups: AtomicU64,
	hits: AtomicU64,
	refreshes: AtomicU64,
	refresh_errors: AtomicU64,
	forced_refreshes: AtomicU64,
	coalesced: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl CacheMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a `get_keys` call and whether it was served from cache.
	pub fn record_lookup(&self, hit: bool) {
		self.lookups.fetch_add(1, Ordering::Relaxed);

		if hit {
			self.hits.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Record a successful upstream refresh and its latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed upstream refresh.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a refresh forced by an unknown `kid`.
	pub fn record_forced_refresh(&self) {
		self.forced_refreshes.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a caller that reused the outcome of a refresh it queued behind.
	pub fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> CacheMetricsSnapshot {
		CacheMetricsSnapshot {
			lookups: self.lookups.load(Ordering::Relaxed),
			hits: self.hits.load(Ordering::Relaxed),
			refreshes: self.refreshes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			forced_refreshes: self.forced_refreshes.load(Ordering::Relaxed),
			coalesced: self.coalesced.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-cache telemetry counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
	/// Total number of key-set lookups.
	pub lookups: u64,
	/// Lookups served from the cache without I/O.
	pub hits: u64,
	/// Successful upstream refreshes.
	pub refreshes: u64,
	/// Failed upstream refreshes.
	pub refresh_errors: u64,
	/// Refreshes forced by an unknown `kid`.
	pub forced_refreshes: u64,
	/// Callers that reused a concurrent refresh instead of fetching.
	pub coalesced: u64,
	/// Microsecond latency of the most recent refresh.
	pub last_refresh_micros: Option<u64>,
}
impl CacheMetricsSnapshot {
	/// Upstream fetch attempts, successful or not.
	pub fn fetch_attempts(&self) -> u64 {
		self.refreshes + self.refresh_errors
	}

	/// Ratio of cache hits to lookups.
	pub fn hit_rate(&self) -> f64 {
		if self.lookups == 0 { 0.0 } else { self.hits as f64 / self.lookups as f64 }
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a key-set lookup.
pub fn record_lookup(issuer: &str, hit: bool) {
	let labels = issuer_labels(issuer);

	metrics::counter!(METRIC_LOOKUPS_TOTAL, labels.iter()).increment(1);

	if hit {
		metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
	}
}

/// Record a successful refresh along with its latency.
pub fn record_refresh_success(issuer: &str, duration: Duration) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(issuer, "success").iter()).increment(1);
	metrics::histogram!(METRIC_REFRESH_DURATION, issuer_labels(issuer).iter())
		.record(duration.as_secs_f64());
}

/// Record a failed refresh, tagged with the failing stage (`discovery` or `jwks`).
pub fn record_refresh_error(issuer: &str, stage: &'static str) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(issuer, stage).iter()).increment(1);
}

/// Record a refresh forced by key rotation.
pub fn record_forced_refresh(issuer: &str) {
	metrics::counter!(METRIC_FORCED_REFRESH_TOTAL, issuer_labels(issuer).iter()).increment(1);
}

/// Record a caller that piggy-backed on another caller's refresh.
pub fn record_coalesced(issuer: &str) {
	metrics::counter!(METRIC_COALESCED_TOTAL, issuer_labels(issuer).iter()).increment(1);
}

/// Record the caller-visible outcome of a gated request (`allow`, `unauthenticated`,
/// `forbidden`).
pub fn record_decision(outcome: &'static str) {
	metrics::counter!(METRIC_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

fn issuer_labels(issuer: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("issuer", issuer.to_owned()));

	labels
}

fn status_labels(issuer: &str, status: &'static str) -> LabelSet {
	let mut labels = issuer_labels(issuer);

	labels.push(Label::new("status", status));

	labels
}
