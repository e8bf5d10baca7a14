//! OIDC discovery: issuer → `jwks_uri`.

// crates.io
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	config::{self, DISCOVERY_PATH},
	error::UpstreamError,
	http::client::Fetcher,
	security,
};

/// Subset of the OpenID Provider Metadata document the gate relies on.
#[derive(Clone, Debug, Deserialize)]
pub struct DiscoveryDocument {
	/// Issuer advertised by the provider.
	#[serde(default)]
	pub issuer: Option<String>,
	/// JWKS endpoint advertised by the provider.
	#[serde(default)]
	pub jwks_uri: Option<String>,
}

/// Resolves the JWKS endpoint of an issuer; performs no caching and no retries.
#[derive(Clone, Debug)]
pub struct DiscoveryResolver {
	fetcher: Fetcher,
}
impl DiscoveryResolver {
	/// Create a resolver on top of a shared fetcher.
	pub fn new(fetcher: Fetcher) -> Self {
		Self { fetcher }
	}

	/// Fetch `{issuer}/.well-known/openid-configuration` and return its `jwks_uri`.
	#[tracing::instrument(skip(self))]
	pub async fn resolve(&self, issuer: &str) -> Result<Url> {
		let url = discovery_url(issuer)?;
		let outcome = self.fetch_jwks_uri(issuer, &url).await;

		outcome.map_err(|err| Error::Discovery { url, source: Arc::new(err) })
	}

	/// Fetch a discovery document from an explicit endpoint and extract its `jwks_uri`.
	pub async fn fetch_jwks_uri(
		&self,
		issuer: &str,
		url: &Url,
	) -> std::result::Result<Url, UpstreamError> {
		let body = self.fetcher.get(url).await?;
		let document: DiscoveryDocument = serde_json::from_slice(&body)?;

		if let Some(advertised) = document.issuer.as_deref()
			&& advertised != issuer
		{
			tracing::warn!(advertised, "discovery document advertises a different issuer");
		}

		let jwks_uri = document
			.jwks_uri
			.as_deref()
			.and_then(|raw| Url::parse(raw).ok())
			.ok_or(UpstreamError::MissingField { field: "jwks_uri" })?;

		if self.fetcher.require_https() {
			security::enforce_upstream_https(&jwks_uri)?;
		}

		tracing::debug!(jwks_uri = %jwks_uri, "resolved jwks_uri via discovery");

		Ok(jwks_uri)
	}
}

/// Discovery endpoint for an issuer, without doubling a trailing slash.
pub fn discovery_url(issuer: &str) -> Result<Url> {
	config::join_issuer(issuer, DISCOVERY_PATH)
}
