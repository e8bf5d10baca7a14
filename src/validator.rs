//! Signature and claim verification.
//!
//! Audience (`aud`) is deliberately not validated: tokens issued to public clients may omit or
//! vary it, and the gate authorizes on realm roles instead.

// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	claims::Claims,
	config::GateConfig,
	error::InvalidTokenReason,
	key::KeyResolver,
};

const REQUIRED_CLAIMS: [&str; 3] = ["exp", "iss", "sub"];

/// Verifies bearer tokens against the issuer's published keys.
#[derive(Clone, Debug)]
pub struct TokenValidator {
	issuer: Arc<str>,
	algorithms: Arc<[Algorithm]>,
	leeway: Duration,
	keys: KeyResolver,
}
impl TokenValidator {
	/// Create a validator for the configured issuer.
	pub fn new(config: &GateConfig, keys: KeyResolver) -> Self {
		Self {
			issuer: Arc::from(config.issuer.as_str()),
			algorithms: Arc::from(config.algorithms.as_slice()),
			leeway: config.leeway,
			keys,
		}
	}

	/// Key resolver used for signature keys.
	pub fn keys(&self) -> &KeyResolver {
		&self.keys
	}

	/// Verify `token` and return its claims.
	///
	/// Checks run in order: header decoding, algorithm allow-list, key resolution, signature,
	/// `exp`/`nbf` with leeway, `iss` equality, presence of `sub`. The allow-list runs before
	/// key resolution so a forbidden algorithm never causes a key-set refresh.
	#[tracing::instrument(skip_all, fields(issuer = %self.issuer))]
	pub async fn validate(&self, token: &str) -> Result<Claims> {
		let header = jsonwebtoken::decode_header(token)?;

		if !self.algorithms.contains(&header.alg) {
			return Err(Error::InvalidToken(InvalidTokenReason::DisallowedAlgorithm(header.alg)));
		}

		let jwk = self.keys.resolve_key(&header).await?;
		let kid = header.kid.as_deref();
		let key = DecodingKey::from_jwk(&jwk).map_err(|err| {
			tracing::debug!(?kid, error = %err, "jwk cannot be used for verification");

			Error::InvalidToken(InvalidTokenReason::UnusableKey)
		})?;
		// Required claims are checked on the untyped payload; typed decoding would fail first.
		let data = jsonwebtoken::decode::<Value>(token, &key, &self.validation(header.alg))?;
		let claims = serde_json::from_value::<Claims>(data.claims).map_err(|err| {
			tracing::debug!(?kid, error = %err, "verified claims have an unexpected shape");

			Error::InvalidToken(InvalidTokenReason::Malformed)
		})?;

		tracing::debug!(?kid, sub = %claims.sub, "token verified");

		Ok(claims)
	}

	fn validation(&self, alg: Algorithm) -> Validation {
		let mut validation = Validation::new(alg);

		validation.leeway = self.leeway.as_secs();
		validation.validate_exp = true;
		validation.validate_nbf = true;
		validation.validate_aud = false;
		validation.set_issuer(&[&*self.issuer]);
		validation.set_required_spec_claims(&REQUIRED_CLAIMS);

		validation
	}
}
