//! Crate-wide error types, rejection mapping, and `Result` alias.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// crates.io
use http::StatusCode;
use jsonwebtoken::{Algorithm, errors::ErrorKind};
// self
use crate::_prelude::*;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the gate.
///
/// Every variant collapses into one of the two caller-visible [`Rejection`]s; the detail is kept
/// for server-side logs only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Authorization header missing, malformed, or not a bearer credential.
	#[error("Missing or malformed Authorization header: {0}.")]
	MissingAuth(&'static str),
	/// OIDC discovery document could not be fetched or lacked `jwks_uri`.
	#[error("OIDC discovery via {url} failed: {source}")]
	Discovery {
		/// Discovery endpoint that was queried.
		url: Url,
		/// Underlying upstream failure.
		#[source]
		source: Arc<UpstreamError>,
	},
	/// JWKS document could not be fetched or parsed.
	#[error("JWKS fetch from {url} failed: {source}")]
	JwksFetch {
		/// JWKS endpoint that was queried.
		url: Url,
		/// Underlying upstream failure.
		#[source]
		source: Arc<UpstreamError>,
	},
	/// Token header does not name a signing key.
	#[error("Token header carries no key identifier.")]
	MissingKid,
	/// No key with the token's `kid` exists, even after a forced refresh.
	#[error("No signing key with kid '{kid}' after a forced refresh.")]
	UnknownKey {
		/// Key identifier taken from the token header.
		kid: String,
	},
	/// Signature or claim verification failed.
	#[error("Token rejected: {0}.")]
	InvalidToken(InvalidTokenReason),
	/// Authenticated caller lacks the roles required by the operation.
	#[error("Forbidden: {0}.")]
	Forbidden(ForbiddenReason),

	#[cfg(feature = "prometheus")]
	/// Metrics recorder installation failed.
	#[error("Metrics error: {0}")]
	Metrics(String),
	/// Security policy violated by configuration.
	#[error("Security violation: {0}")]
	Security(String),
	/// Configuration value rejected.
	#[error("Validation failed for {field}: {reason}")]
	Validation {
		/// Configuration field at fault.
		field: &'static str,
		/// Human readable explanation.
		reason: String,
	},
}
impl Error {
	/// Collapse the error into the outcome reported to the caller.
	pub fn rejection(&self) -> Rejection {
		match self {
			Self::Forbidden(_) => Rejection::Forbidden,
			_ => Rejection::Unauthenticated,
		}
	}

	/// Whether the failure points at the identity provider rather than at the caller.
	pub fn is_upstream(&self) -> bool {
		matches!(self, Self::Discovery { .. } | Self::JwksFetch { .. })
	}
}
impl From<jsonwebtoken::errors::Error> for Error {
	fn from(value: jsonwebtoken::errors::Error) -> Self {
		Self::InvalidToken(InvalidTokenReason::from(value.kind()))
	}
}

/// Failure talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
	#[error(transparent)]
	/// Connection, TLS, or timeout failure.
	Transport(#[from] reqwest::Error),
	#[error(transparent)]
	/// Response body was not the expected JSON.
	Decode(#[from] serde_json::Error),
	#[error("Upstream HTTP status {status}: {body:?}")]
	/// Non-success status code.
	Status {
		/// Status returned by the provider.
		status: StatusCode,
		/// Response body, when readable.
		body: Option<String>,
	},
	#[error("Response size {size} bytes exceeds the configured guard of {limit} bytes.")]
	/// Response body exceeded the configured size guard.
	TooLarge {
		/// Observed body size.
		size: usize,
		/// Configured limit.
		limit: u64,
	},
	#[error("Document field `{field}` is missing or invalid.")]
	/// Required document field absent or unusable.
	MissingField {
		/// Name of the JSON field.
		field: &'static str,
	},
	#[error("Upstream URL {0} must use HTTPS.")]
	/// Upstream advertised a plain-HTTP endpoint while HTTPS is required.
	Insecure(Url),
}

/// Why a token failed verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidTokenReason {
	/// Token is not a decodable compact JWS.
	Malformed,
	/// Header algorithm is outside the server-side allow-list.
	DisallowedAlgorithm(Algorithm),
	/// Signature does not verify against the resolved key.
	BadSignature,
	/// `exp` lies in the past, beyond the configured leeway.
	Expired,
	/// `nbf` lies in the future, beyond the configured leeway.
	NotYetValid,
	/// `iss` differs from the configured issuer.
	IssuerMismatch,
	/// A required claim is absent.
	MissingClaim(String),
	/// Resolved JWK cannot be turned into a verification key.
	UnusableKey,
	/// Any other verification failure reported by the JWT library.
	Other(String),
}
impl Display for InvalidTokenReason {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::Malformed => f.write_str("malformed token"),
			Self::DisallowedAlgorithm(alg) => write!(f, "algorithm {alg:?} is not accepted"),
			Self::BadSignature => f.write_str("bad signature"),
			Self::Expired => f.write_str("token expired"),
			Self::NotYetValid => f.write_str("token not yet valid"),
			Self::IssuerMismatch => f.write_str("issuer mismatch"),
			Self::MissingClaim(claim) => write!(f, "missing claim `{claim}`"),
			Self::UnusableKey => f.write_str("signing key unusable"),
			Self::Other(detail) => f.write_str(detail),
		}
	}
}
impl From<&ErrorKind> for InvalidTokenReason {
	fn from(kind: &ErrorKind) -> Self {
		match kind {
			ErrorKind::InvalidSignature => Self::BadSignature,
			ErrorKind::ExpiredSignature => Self::Expired,
			ErrorKind::ImmatureSignature => Self::NotYetValid,
			ErrorKind::InvalidIssuer => Self::IssuerMismatch,
			ErrorKind::MissingRequiredClaim(claim) => Self::MissingClaim(claim.clone()),
			ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => Self::UnusableKey,
			ErrorKind::InvalidToken
			| ErrorKind::Base64(_)
			| ErrorKind::Json(_)
			| ErrorKind::Utf8(_) => Self::Malformed,
			other => Self::Other(format!("{other:?}")),
		}
	}
}

/// Why an authenticated caller was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForbiddenReason {
	/// Token carried no realm roles at all.
	NoRoles,
	/// None of the caller's roles is in the required set.
	InsufficientRole,
}
impl Display for ForbiddenReason {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			Self::NoRoles => f.write_str("no roles"),
			Self::InsufficientRole => f.write_str("insufficient role"),
		}
	}
}

/// Caller-visible outcome of a refused request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rejection {
	/// Credentials absent or not verifiable (401).
	Unauthenticated,
	/// Credentials valid but roles insufficient (403).
	Forbidden,
}
impl Rejection {
	/// HTTP status the routing layer should answer with.
	pub fn status(self) -> StatusCode {
		match self {
			Self::Unauthenticated => StatusCode::UNAUTHORIZED,
			Self::Forbidden => StatusCode::FORBIDDEN,
		}
	}

	/// Fixed response message; never carries verification detail.
	pub fn public_message(self) -> &'static str {
		match self {
			Self::Unauthenticated => "unauthenticated",
			Self::Forbidden => "forbidden",
		}
	}

	/// Label used for metrics.
	pub fn as_str(self) -> &'static str {
		self.public_message()
	}
}
impl Display for Rejection {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.write_str(self.public_message())
	}
}
