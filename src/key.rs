//! Signing-key lookup with refresh-on-miss for key rotation.

// crates.io
use jsonwebtoken::{
	Header,
	jwk::{Jwk, JwkSet, PublicKeyUse},
};
// self
use crate::{_prelude::*, cache::manager::JwksCache};

/// Finds the JWK a token was signed with.
#[derive(Clone, Debug)]
pub struct KeyResolver {
	cache: JwksCache,
}
impl KeyResolver {
	/// Create a resolver backed by the given cache.
	pub fn new(cache: JwksCache) -> Self {
		Self { cache }
	}

	/// Cache the resolver reads from.
	pub fn cache(&self) -> &JwksCache {
		&self.cache
	}

	/// Resolve the key named by a token's unverified header.
	pub async fn resolve_key(&self, header: &Header) -> Result<Jwk> {
		let kid = header.kid.as_deref().ok_or(Error::MissingKid)?;

		self.resolve_kid(kid).await
	}

	/// Resolve a key by identifier.
	///
	/// A miss against a cached set triggers one forced refresh; a miss against a set fetched by
	/// this call, or a second miss, is [`Error::UnknownKey`].
	#[tracing::instrument(skip(self), fields(issuer = %self.cache.issuer()))]
	pub async fn resolve_kid(&self, kid: &str) -> Result<Jwk> {
		let lookup = self.cache.lookup(false).await?;

		if let Some(jwk) = find_key(&lookup.keys, kid) {
			return Ok(jwk.clone());
		}
		if lookup.refreshed {
			tracing::info!("kid not in freshly fetched key set");

			return Err(Error::UnknownKey { kid: kid.to_owned() });
		}

		tracing::info!("kid not in cached key set; forcing refresh");

		let keys = self.cache.get_keys(true).await?;

		find_key(&keys, kid).cloned().ok_or_else(|| Error::UnknownKey { kid: kid.to_owned() })
	}
}

/// First signing key with the given `kid`; keys published for encryption are ignored.
pub fn find_key<'a>(keys: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
	keys.keys.iter().find(|jwk| {
		jwk.common.key_id.as_deref() == Some(kid)
			&& !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
	})
}
