//! Signature and claim verification through the full gate.

// std
use std::time::Duration;
// crates.io
use jsonwebtoken::{Algorithm, EncodingKey};
use realm_gate::{Error, Gate, InvalidTokenReason, Result};
use serde_json::json;
// self
use crate::support::*;

async fn ready_idp() -> MockIdp {
	let idp = MockIdp::start().await;

	idp.mount_discovery(1).await;
	idp.mount_jwks(primary_keys(), 1).await;

	idp
}

async fn reason(gate: &Gate, token: &str) -> InvalidTokenReason {
	match gate.authenticate(Some(&bearer(token))).await {
		Err(Error::InvalidToken(reason)) => reason,
		other => panic!("expected an invalid token, got {other:?}"),
	}
}

#[tokio::test]
async fn accepts_tokens_regardless_of_audience() -> Result<()> {
	let idp = ready_idp().await;
	let gate = idp.gate();
	let mut without_aud = claims(&idp.issuer(), &["analyst"]);
	let mut foreign_aud = without_aud.clone();

	foreign_aud["aud"] = json!(["some-other-client", "account"]);
	without_aud["azp"] = json!("public-client");

	for payload in [without_aud, foreign_aud] {
		let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);
		let principal = gate.authenticate(Some(&bearer(&token))).await?;

		assert_eq!(principal.subject, "3f2a6c1e-analyst");
		assert!(principal.has_role("analyst"));
	}

	Ok(())
}

#[tokio::test]
async fn rejects_expired_tokens() {
	let idp = ready_idp().await;
	let gate = idp.gate();
	let mut payload = claims(&idp.issuer(), &["admin"]);

	payload["exp"] = json!(now() - 3_600);

	let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::Expired);
}

#[tokio::test]
async fn leeway_absorbs_small_clock_skew() -> Result<()> {
	let idp = ready_idp().await;
	let gate = Gate::new(idp.config().with_leeway(Duration::from_secs(30)))?;
	let mut payload = claims(&idp.issuer(), &["admin"]);

	payload["exp"] = json!(now() - 5);

	let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

	gate.authenticate(Some(&bearer(&token))).await?;

	Ok(())
}

#[tokio::test]
async fn rejects_tokens_not_yet_valid() {
	let idp = ready_idp().await;
	let gate = idp.gate();
	let mut payload = claims(&idp.issuer(), &["admin"]);

	payload["nbf"] = json!(now() + 3_600);

	let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::NotYetValid);
}

#[tokio::test]
async fn rejects_foreign_issuers() {
	let idp = ready_idp().await;
	let gate = idp.gate();
	let payload = claims("https://sso.example.com/realms/other", &["admin"]);
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::IssuerMismatch);

	let trailing = claims(&format!("{}/", idp.issuer()), &["admin"]);
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &trailing);

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::IssuerMismatch);
}

#[tokio::test]
async fn rejects_signatures_from_other_keys() {
	let idp = ready_idp().await;
	let gate = idp.gate();
	// Signed with the rotated private key but claiming the primary `kid`.
	let token = sign(PRIMARY_KID, ROTATED_PEM, &claims(&idp.issuer(), &["admin"]));

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::BadSignature);
}

#[tokio::test]
async fn rejects_tokens_without_subject() {
	let idp = ready_idp().await;
	let gate = idp.gate();
	let mut payload = claims(&idp.issuer(), &["admin"]);

	payload.as_object_mut().expect("object").remove("sub");

	let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

	assert_eq!(reason(&gate, &token).await, InvalidTokenReason::MissingClaim("sub".into()));
}

#[tokio::test]
async fn rejects_tokens_without_issuer_or_expiry() {
	let idp = ready_idp().await;
	let gate = idp.gate();

	for claim in ["iss", "exp"] {
		let mut payload = claims(&idp.issuer(), &["admin"]);

		payload.as_object_mut().expect("object").remove(claim);

		let token = sign(PRIMARY_KID, PRIMARY_PEM, &payload);

		assert_eq!(reason(&gate, &token).await, InvalidTokenReason::MissingClaim(claim.into()));
	}
}

#[tokio::test]
async fn symmetric_tokens_never_reach_the_key_set() {
	let idp = MockIdp::start().await;

	idp.mount_discovery(0).await;
	idp.mount_jwks(primary_keys(), 0).await;

	let gate = idp.gate();
	let token = sign_with(
		Algorithm::HS256,
		PRIMARY_KID,
		&EncodingKey::from_secret(PRIMARY_N.as_bytes()),
		&claims(&idp.issuer(), &["admin"]),
	);

	assert_eq!(
		reason(&gate, &token).await,
		InvalidTokenReason::DisallowedAlgorithm(Algorithm::HS256)
	);
	assert_eq!(gate.status().await.metrics.lookups, 0);
}

#[tokio::test]
async fn unsigned_tokens_are_malformed() {
	let idp = MockIdp::start().await;

	idp.mount_discovery(0).await;
	idp.mount_jwks(primary_keys(), 0).await;

	let gate = idp.gate();
	// {"alg":"none","kid":"primary"} . {"sub":"x"} .
	let token = "eyJhbGciOiJub25lIiwia2lkIjoicHJpbWFyeSJ9.eyJzdWIiOiJ4In0.";

	assert_eq!(reason(&gate, token).await, InvalidTokenReason::Malformed);
}

#[tokio::test]
async fn additional_algorithms_can_be_allowed() -> Result<()> {
	let idp = ready_idp().await;
	let gate = Gate::new(idp.config().with_algorithms([Algorithm::RS256, Algorithm::PS256]))?;
	let key = EncodingKey::from_rsa_pem(PRIMARY_PEM).expect("pem");
	let token = sign_with(Algorithm::PS256, PRIMARY_KID, &key, &claims(&idp.issuer(), &["admin"]));

	gate.authenticate(Some(&bearer(&token))).await?;

	Ok(())
}
