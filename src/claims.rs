//! Typed token claims and realm-role extraction.
//!
//! The realm role list lives in a loosely structured part of the payload
//! (`realm_access.roles`). It is normalised once, while deserialising, into a [`BTreeSet`]: a
//! missing or oddly shaped `realm_access` yields no roles, and non-string entries are dropped.

// std
use std::collections::BTreeSet;
// crates.io
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Verified token payload.
///
/// Only the claims the gate relies on are typed; everything else (including `aud`) is kept in
/// [`Claims::extra`] untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
	/// Issuer.
	pub iss: String,
	/// Subject identifier.
	pub sub: String,
	/// Expiry as seconds since the Unix epoch.
	pub exp: u64,
	/// Realm roles granted by the identity provider.
	#[serde(default, deserialize_with = "lenient_realm_access")]
	pub realm_access: RealmAccess,
	/// Remaining claims.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

/// `realm_access` claim in its normalised form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealmAccess {
	/// Distinct role names.
	#[serde(default)]
	pub roles: BTreeSet<String>,
}

/// Authenticated caller, scoped to one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
	/// `sub` claim of the verified token.
	pub subject: String,
	/// Realm roles of the caller.
	pub roles: BTreeSet<String>,
}
impl Principal {
	/// Derive the principal from verified claims.
	pub fn from_claims(claims: &Claims) -> Self {
		Self { subject: claims.sub.clone(), roles: extract_roles(claims) }
	}

	/// Whether the caller holds the given role.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.contains(role)
	}
}
impl From<Claims> for Principal {
	fn from(claims: Claims) -> Self {
		Self { subject: claims.sub, roles: claims.realm_access.roles }
	}
}

/// Realm roles carried by the claims; empty when the token has none.
pub fn extract_roles(claims: &Claims) -> BTreeSet<String> {
	claims.realm_access.roles.clone()
}

fn lenient_realm_access<'de, D>(deserializer: D) -> Result<RealmAccess, D::Error>
where
	D: Deserializer<'de>,
{
	let value = Value::deserialize(deserializer)?;
	let roles = value
		.get("roles")
		.and_then(Value::as_array)
		.map(|roles| roles.iter().filter_map(Value::as_str).map(str::to_owned).collect())
		.unwrap_or_default();

	Ok(RealmAccess { roles })
}
