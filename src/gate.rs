//! Request-facing entry point: bearer parsing, verification, and role checks.

// crates.io
use http::{HeaderMap, header::AUTHORIZATION};
use reqwest::Client;
// self
use crate::{
	_prelude::*,
	authz::{self, RequiredRoles},
	cache::manager::{CacheStatus, JwksCache},
	claims::Principal,
	config::{EmptyRolePolicy, GateConfig},
	error::Rejection,
	key::KeyResolver,
	metrics,
	validator::TokenValidator,
};

const BEARER: &str = "bearer";

/// Verification and authorization pipeline for one issuer.
///
/// Cheap to clone; clones share the same key cache.
#[derive(Clone, Debug)]
pub struct Gate {
	policy: EmptyRolePolicy,
	cache: JwksCache,
	validator: TokenValidator,
}
impl Gate {
	/// Build a gate with the default HTTP client.
	pub fn new(config: GateConfig) -> Result<Self> {
		let cache = JwksCache::new(&config)?;

		Ok(Self::assemble(&config, cache))
	}

	/// Build a gate using the supplied HTTP client.
	pub fn with_client(config: GateConfig, client: Client) -> Result<Self> {
		let cache = JwksCache::with_client(&config, client)?;

		Ok(Self::assemble(&config, cache))
	}

	fn assemble(config: &GateConfig, cache: JwksCache) -> Self {
		let validator = TokenValidator::new(config, KeyResolver::new(cache.clone()));

		Self { policy: config.empty_role_policy, cache, validator }
	}

	/// Key cache backing the gate.
	pub fn cache(&self) -> &JwksCache {
		&self.cache
	}

	/// Token validator used by [`Gate::authenticate`].
	pub fn validator(&self) -> &TokenValidator {
		&self.validator
	}

	/// Prefetch the key set.
	///
	/// Failures are logged and swallowed; the first protected request retries and reports them.
	pub async fn warm_up(&self) {
		match self.cache.get_keys(false).await {
			Ok(keys) => tracing::info!(
				issuer = self.cache.issuer(),
				keys = keys.keys.len(),
				"jwks warm-up complete"
			),
			Err(err) => tracing::warn!(
				issuer = self.cache.issuer(),
				error = %err,
				"jwks warm-up failed; deferring to first request"
			),
		}
	}

	/// Verify the raw `Authorization` header value and derive the caller.
	pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Principal> {
		let token = parse_bearer(authorization)?;
		let claims = self.validator.validate(token).await?;

		Ok(Principal::from(claims))
	}

	/// Same as [`Gate::authenticate`], reading the header from a request header map.
	pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<Principal> {
		let authorization = authorization_header(headers)?;

		self.authenticate(authorization).await
	}

	/// Check the caller's roles against an operation's requirement.
	pub fn require(&self, principal: &Principal, required: &RequiredRoles) -> Result<()> {
		authz::decide(&principal.roles, required, self.policy).into_result()
	}

	/// Run the whole pipeline and collapse any failure into a caller-visible [`Rejection`].
	///
	/// The cause is logged here and never leaves the gate.
	pub async fn authorize_request(
		&self,
		authorization: Option<&str>,
		required: &RequiredRoles,
	) -> std::result::Result<Principal, Rejection> {
		let outcome = match self.authenticate(authorization).await {
			Ok(principal) => self.require(&principal, required).map(|()| principal),
			Err(err) => Err(err),
		};

		self.conclude(outcome)
	}

	/// Same as [`Gate::authorize_request`], reading the header from a request header map.
	pub async fn authorize_headers(
		&self,
		headers: &HeaderMap,
		required: &RequiredRoles,
	) -> std::result::Result<Principal, Rejection> {
		match authorization_header(headers) {
			Ok(authorization) => self.authorize_request(authorization, required).await,
			Err(err) => self.conclude(Err(err)),
		}
	}

	/// Status of the key cache.
	pub async fn status(&self) -> CacheStatus {
		self.cache.status().await
	}

	fn conclude(&self, outcome: Result<Principal>) -> std::result::Result<Principal, Rejection> {
		match outcome {
			Ok(principal) => {
				tracing::debug!(sub = %principal.subject, "request authorized");

				metrics::record_decision("allow");

				Ok(principal)
			},
			Err(err) => {
				log_rejection(&err);

				let rejection = err.rejection();

				metrics::record_decision(rejection.as_str());

				Err(rejection)
			},
		}
	}
}

/// Extract the bearer credential from a raw `Authorization` header value.
///
/// The scheme is matched case-insensitively. A missing header, another scheme, an empty
/// credential, or one containing whitespace is [`Error::MissingAuth`].
pub fn parse_bearer(authorization: Option<&str>) -> Result<&str> {
	let raw = authorization.ok_or(Error::MissingAuth("header absent"))?.trim();
	let (scheme, credential) =
		raw.split_once(char::is_whitespace).ok_or(Error::MissingAuth("no credential"))?;

	if !scheme.eq_ignore_ascii_case(BEARER) {
		return Err(Error::MissingAuth("scheme is not Bearer"));
	}

	let credential = credential.trim();

	if credential.is_empty() {
		return Err(Error::MissingAuth("empty credential"));
	}
	if credential.contains(char::is_whitespace) {
		return Err(Error::MissingAuth("credential contains whitespace"));
	}

	Ok(credential)
}

fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>> {
	let mut values = headers.get_all(AUTHORIZATION).iter();
	let Some(value) = values.next() else {
		return Ok(None);
	};

	if values.next().is_some() {
		return Err(Error::MissingAuth("multiple Authorization headers"));
	}

	value.to_str().map(Some).map_err(|_| Error::MissingAuth("header is not visible ASCII"))
}

fn log_rejection(err: &Error) {
	match err {
		Error::MissingAuth(reason) => tracing::debug!(reason, "request rejected"),
		Error::Discovery { .. } | Error::JwksFetch { .. } => {
			tracing::error!(error = %err, "identity provider unavailable");
		},
		Error::MissingKid | Error::UnknownKey { .. } => {
			tracing::info!(error = %err, "token key not resolvable");
		},
		Error::InvalidToken(reason) => tracing::info!(%reason, "token rejected"),
		Error::Forbidden(reason) => tracing::info!(%reason, "request forbidden"),
		_ => tracing::error!(error = %err, "gate misconfigured; failing closed"),
	}
}
