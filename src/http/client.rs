//! HTTP client integration for discovery and JWKS retrieval.

// crates.io
use jsonwebtoken::jwk::{Jwk, JwkSet};
use reqwest::{Client, redirect::Policy};
use serde::Deserialize;
// self
use crate::{_prelude::*, config::GateConfig, error::UpstreamError, security};

/// Maximum redirect depth followed for upstream requests.
pub const MAX_REDIRECTS: usize = 3;

/// Thin wrapper around [`reqwest::Client`] applying the gate's timeout, size guard, and HTTPS
/// policy to every request.
#[derive(Clone, Debug)]
pub struct Fetcher {
	client: Client,
	timeout: Duration,
	max_response_bytes: u64,
	require_https: bool,
}
impl Fetcher {
	/// Build a fetcher with the default reqwest client.
	pub fn new(config: &GateConfig) -> Result<Self> {
		let client = Client::builder()
			.redirect(Policy::limited(MAX_REDIRECTS))
			.user_agent(format!("realm-gate/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(config.http_timeout)
			.build()
			.map_err(|err| Error::Validation {
				field: "http_client",
				reason: format!("Failed to build HTTP client: {err}."),
			})?;

		Ok(Self::with_client(config, client))
	}

	/// Build a fetcher using the supplied HTTP client (primarily for tests).
	pub fn with_client(config: &GateConfig, client: Client) -> Self {
		Self {
			client,
			timeout: config.http_timeout,
			max_response_bytes: config.max_response_bytes,
			require_https: config.require_https,
		}
	}

	/// Whether upstream URLs must use HTTPS.
	pub fn require_https(&self) -> bool {
		self.require_https
	}

	/// Issue a GET and return the body, enforcing timeout, status, and size guard.
	pub async fn get(&self, url: &Url) -> std::result::Result<Vec<u8>, UpstreamError> {
		if self.require_https {
			security::enforce_upstream_https(url)?;
		}

		let start = Instant::now();
		let response = self
			.client
			.get(url.clone())
			.header(http::header::ACCEPT, "application/json")
			.timeout(self.timeout)
			.send()
			.await?;
		let status = response.status();

		if !status.is_success() {
			let body = response.text().await.ok();

			return Err(UpstreamError::Status { status, body });
		}

		let bytes = response.bytes().await?;

		if bytes.len() as u64 > self.max_response_bytes {
			return Err(UpstreamError::TooLarge {
				size: bytes.len(),
				limit: self.max_response_bytes,
			});
		}

		tracing::debug!(url = %url, %status, elapsed = ?start.elapsed(), "upstream fetch complete");

		Ok(bytes.to_vec())
	}

	/// Fetch and parse a JWKS document.
	pub async fn fetch_jwks(&self, url: &Url) -> std::result::Result<JwkSet, UpstreamError> {
		let body = self.get(url).await?;

		parse_jwks(&body)
	}
}

#[derive(Deserialize)]
struct RawJwks {
	keys: Option<Vec<serde_json::Value>>,
}

/// Parse a JWKS document, skipping individual keys the JWT library cannot represent.
///
/// A document without a `keys` array is rejected outright.
pub fn parse_jwks(body: &[u8]) -> std::result::Result<JwkSet, UpstreamError> {
	let raw: RawJwks = serde_json::from_slice(body)?;
	let entries = raw.keys.ok_or(UpstreamError::MissingField { field: "keys" })?;
	let mut keys = Vec::with_capacity(entries.len());

	for entry in entries {
		match serde_json::from_value::<Jwk>(entry) {
			Ok(jwk) => keys.push(jwk),
			Err(err) => {
				tracing::warn!(error = %err, "skipping unsupported JWK entry");
			},
		}
	}

	Ok(JwkSet { keys })
}
