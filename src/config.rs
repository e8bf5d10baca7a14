//! Gate configuration, defaults, and validation.
//!
//! Configuration is either built in code (`GateConfig::new` plus `with_*` setters), deserialised
//! with `serde`, or loaded from `REALM_GATE_*` environment variables.

// std
use std::{collections::HashMap, env};
// crates.io
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
// self
use crate::{_prelude::*, security};

/// Default key-set time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
/// Default timeout applied to every upstream request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum accepted upstream timeout.
pub const MIN_HTTP_TIMEOUT: Duration = Duration::from_millis(100);
/// Default clock-skew leeway for `exp`/`nbf`.
pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);
/// Upper bound on the clock-skew leeway.
pub const MAX_LEEWAY: Duration = Duration::from_secs(300);
/// Default size guard (1 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 1_048_576;
/// Path of the discovery document relative to the issuer.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";
/// Keycloak certificate endpoint relative to the realm issuer.
pub const KEYCLOAK_CERTS_PATH: &str = "protocol/openid-connect/certs";

const ENV_PREFIX: &str = "REALM_GATE_";

/// Where the JWKS endpoint comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum JwksSource {
	/// Resolve `jwks_uri` from the issuer's discovery document on every refresh.
	#[default]
	Discovery,
	/// Use a fixed JWKS URL and never touch the discovery endpoint.
	Fixed {
		/// JWKS endpoint.
		url: Url,
	},
}
impl JwksSource {
	/// Derive the Keycloak-style JWKS URL (`{issuer}/protocol/openid-connect/certs`).
	pub fn issuer_relative(issuer: &str) -> Result<Self> {
		let url = join_issuer(issuer, KEYCLOAK_CERTS_PATH)?;

		Ok(Self::Fixed { url })
	}
}

/// Policy applied to callers whose token carries no realm roles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyRolePolicy {
	/// Deny with "no roles" before the intersection check.
	#[default]
	RejectEmpty,
	/// Let the intersection check fail naturally.
	Intersect,
}

/// Complete configuration of a [`Gate`](crate::Gate).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
	/// Trusted issuer, compared to `iss` by exact string equality.
	pub issuer: String,
	/// JWKS endpoint strategy.
	#[serde(default)]
	pub jwks_source: JwksSource,
	/// Signature algorithms accepted from token headers.
	#[serde(default = "default_algorithms")]
	pub algorithms: Vec<Algorithm>,
	/// How long a fetched key set stays fresh.
	#[serde(default = "default_cache_ttl")]
	pub cache_ttl: Duration,
	/// Timeout for each discovery or JWKS request.
	#[serde(default = "default_http_timeout")]
	pub http_timeout: Duration,
	/// Clock-skew tolerance applied to `exp` and `nbf`.
	#[serde(default = "default_leeway")]
	pub leeway: Duration,
	/// Handling of tokens without realm roles.
	#[serde(default)]
	pub empty_role_policy: EmptyRolePolicy,
	/// Whether issuer and JWKS endpoints must use HTTPS.
	#[serde(default = "default_true")]
	pub require_https: bool,
	/// Maximum accepted size of discovery and JWKS documents.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
}
impl GateConfig {
	/// Construct a configuration with defaults for everything but the issuer.
	pub fn new(issuer: impl Into<String>) -> Self {
		Self {
			issuer: issuer.into(),
			jwks_source: JwksSource::Discovery,
			algorithms: default_algorithms(),
			cache_ttl: DEFAULT_CACHE_TTL,
			http_timeout: DEFAULT_HTTP_TIMEOUT,
			leeway: DEFAULT_LEEWAY,
			empty_role_policy: EmptyRolePolicy::default(),
			require_https: true,
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
		}
	}

	/// Load configuration from the process environment.
	pub fn from_env() -> Result<Self> {
		Self::from_vars(&env::vars().collect())
	}

	/// Load configuration from a variable map (used by tests).
	///
	/// Recognised keys (all prefixed with `REALM_GATE_`): `ISSUER`, `JWKS_STRATEGY`
	/// (`discovery`, `fixed`, `issuer_relative`), `JWKS_URL`, `ALGORITHMS` (comma separated),
	/// `CACHE_TTL_SECONDS`, `HTTP_TIMEOUT_MS`, `LEEWAY_SECONDS`, `EMPTY_ROLE_POLICY`
	/// (`reject_empty`, `intersect`), `REQUIRE_HTTPS`, `MAX_RESPONSE_BYTES`.
	/// `KEYCLOAK_ISSUER` is accepted when `REALM_GATE_ISSUER` is absent.
	pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
		let var = |name: &str| vars.get(&format!("{ENV_PREFIX}{name}")).map(|v| v.trim());
		let issuer = var("ISSUER")
			.or_else(|| vars.get("KEYCLOAK_ISSUER").map(|v| v.trim()))
			.filter(|v| !v.is_empty())
			.ok_or_else(|| Error::Validation {
				field: "issuer",
				reason: format!("Set {ENV_PREFIX}ISSUER or KEYCLOAK_ISSUER."),
			})?;
		let mut config = Self::new(issuer);

		config.jwks_source = match var("JWKS_STRATEGY").unwrap_or("discovery") {
			"discovery" => JwksSource::Discovery,
			"issuer_relative" => JwksSource::issuer_relative(issuer)?,
			"fixed" => {
				let raw = var("JWKS_URL").ok_or_else(|| Error::Validation {
					field: "jwks_source",
					reason: format!("Strategy `fixed` requires {ENV_PREFIX}JWKS_URL."),
				})?;

				let url = Url::parse(raw).map_err(|err| Error::Validation {
					field: "jwks_source",
					reason: format!("Invalid JWKS URL `{raw}`: {err}."),
				})?;

				JwksSource::Fixed { url }
			},
			other => {
				return Err(Error::Validation {
					field: "jwks_source",
					reason: format!("Unknown strategy `{other}`."),
				});
			},
		};

		if let Some(raw) = var("ALGORITHMS") {
			config.algorithms = raw
				.split(',')
				.map(str::trim)
				.filter(|name| !name.is_empty())
				.map(|name| {
					name.parse::<Algorithm>().map_err(|_| Error::Validation {
						field: "algorithms",
						reason: format!("Unknown algorithm `{name}`."),
					})
				})
				.collect::<Result<_>>()?;
		}
		if let Some(raw) = var("CACHE_TTL_SECONDS") {
			config.cache_ttl = Duration::from_secs(parse_number(raw, "cache_ttl")?);
		}
		if let Some(raw) = var("HTTP_TIMEOUT_MS") {
			config.http_timeout = Duration::from_millis(parse_number(raw, "http_timeout")?);
		}
		if let Some(raw) = var("LEEWAY_SECONDS") {
			config.leeway = Duration::from_secs(parse_number(raw, "leeway")?);
		}
		if let Some(raw) = var("EMPTY_ROLE_POLICY") {
			config.empty_role_policy = match raw {
				"reject_empty" => EmptyRolePolicy::RejectEmpty,
				"intersect" => EmptyRolePolicy::Intersect,
				other => {
					return Err(Error::Validation {
						field: "empty_role_policy",
						reason: format!("Unknown policy `{other}`."),
					});
				},
			};
		}
		if let Some(raw) = var("REQUIRE_HTTPS") {
			config.require_https = match raw.to_ascii_lowercase().as_str() {
				"1" | "true" | "yes" => true,
				"0" | "false" | "no" => false,
				other => {
					return Err(Error::Validation {
						field: "require_https",
						reason: format!("Expected a boolean, got `{other}`."),
					});
				},
			};
		}
		if let Some(raw) = var("MAX_RESPONSE_BYTES") {
			config.max_response_bytes = parse_number(raw, "max_response_bytes")?;
		}

		config.validate()?;

		Ok(config)
	}

	/// Select the JWKS endpoint strategy.
	pub fn with_jwks_source(mut self, source: JwksSource) -> Self {
		self.jwks_source = source;

		self
	}

	/// Replace the accepted algorithm allow-list.
	pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
		self.algorithms = algorithms.into_iter().collect();

		self
	}

	/// Override the key-set TTL.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Override the upstream request timeout.
	pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
		self.http_timeout = timeout;

		self
	}

	/// Override the clock-skew leeway.
	pub fn with_leeway(mut self, leeway: Duration) -> Self {
		self.leeway = leeway;

		self
	}

	/// Select the empty-role policy.
	pub fn with_empty_role_policy(mut self, policy: EmptyRolePolicy) -> Self {
		self.empty_role_policy = policy;

		self
	}

	/// Set HTTPS requirement to the desired value.
	pub fn with_require_https(mut self, require_https: bool) -> Self {
		self.require_https = require_https;

		self
	}

	/// Discovery endpoint for the configured issuer.
	pub fn discovery_url(&self) -> Result<Url> {
		join_issuer(&self.issuer, DISCOVERY_PATH)
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		let issuer = Url::parse(&self.issuer).map_err(|err| Error::Validation {
			field: "issuer",
			reason: format!("Not a valid URL: {err}."),
		})?;

		if issuer.host_str().is_none() {
			return Err(Error::Validation {
				field: "issuer",
				reason: "Must include a host component.".into(),
			});
		}
		if self.require_https {
			security::enforce_https(&issuer)?;

			if let JwksSource::Fixed { url } = &self.jwks_source {
				security::enforce_https(url)?;
			}
		}
		if self.algorithms.is_empty() {
			return Err(Error::Validation {
				field: "algorithms",
				reason: "At least one algorithm must be accepted.".into(),
			});
		}

		security::reject_symmetric_algorithms(&self.algorithms)?;

		if self.cache_ttl.is_zero() {
			return Err(Error::Validation {
				field: "cache_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.http_timeout < MIN_HTTP_TIMEOUT {
			return Err(Error::Validation {
				field: "http_timeout",
				reason: format!("Must be at least {MIN_HTTP_TIMEOUT:?}."),
			});
		}
		if self.leeway > MAX_LEEWAY {
			return Err(Error::Validation {
				field: "leeway",
				reason: format!("Must not exceed {MAX_LEEWAY:?}."),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		Ok(())
	}
}

pub(crate) fn join_issuer(issuer: &str, path: &str) -> Result<Url> {
	let joined = format!("{}/{path}", issuer.trim_end_matches('/'));

	Url::parse(&joined).map_err(|err| Error::Validation {
		field: "issuer",
		reason: format!("Cannot derive `{path}` from issuer: {err}."),
	})
}

fn parse_number(raw: &str, field: &'static str) -> Result<u64> {
	raw.parse().map_err(|err| Error::Validation {
		field,
		reason: format!("Expected a non-negative integer, got `{raw}`: {err}."),
	})
}

fn default_algorithms() -> Vec<Algorithm> {
	vec![Algorithm::RS256]
}

fn default_cache_ttl() -> Duration {
	DEFAULT_CACHE_TTL
}

fn default_http_timeout() -> Duration {
	DEFAULT_HTTP_TIMEOUT
}

fn default_leeway() -> Duration {
	DEFAULT_LEEWAY
}

fn default_true() -> bool {
	true
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}
