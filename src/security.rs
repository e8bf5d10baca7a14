//! Security utilities covering HTTPS enforcement and algorithm allow-list hygiene.
//!
//! # Threat Model
//! Tokens arrive from untrusted callers, so nothing in a token header is trusted beyond being
//! matched against server-side configuration. These helpers keep that configuration from
//! admitting downgrade paths: plain-HTTP key endpoints and symmetric algorithms whose "key" would
//! be public JWKS material.

// crates.io
use jsonwebtoken::Algorithm;
// self
use crate::{_prelude::*, error::UpstreamError};

/// Ensure the provided URL uses HTTPS.
pub fn enforce_https(url: &Url) -> Result<()> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(Error::Security(format!("Upstream URL {url} must use HTTPS.")))
	}
}

/// Same check as [`enforce_https`], for URLs advertised by the identity provider at runtime.
pub fn enforce_upstream_https(url: &Url) -> std::result::Result<(), UpstreamError> {
	if url.scheme() == "https" {
		Ok(())
	} else {
		Err(UpstreamError::Insecure(url.clone()))
	}
}

/// Whether the algorithm is an HMAC family member.
pub fn is_symmetric(alg: Algorithm) -> bool {
	matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

/// Refuse allow-lists containing symmetric algorithms.
///
/// Keys come from a public JWKS document, so accepting `HS*` would let anyone holding the public
/// key material mint tokens.
pub fn reject_symmetric_algorithms(algorithms: &[Algorithm]) -> Result<()> {
	if let Some(alg) = algorithms.iter().copied().find(|alg| is_symmetric(*alg)) {
		tracing::warn!(?alg, "symmetric algorithm refused in allow-list");

		return Err(Error::Security(format!(
			"Algorithm {alg:?} cannot be verified against public JWKS keys."
		)));
	}

	Ok(())
}
