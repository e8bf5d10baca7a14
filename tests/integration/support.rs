//! Mock identity provider and token minting shared by the integration tests.

// std
use std::time::Duration;
// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use realm_gate::{Gate, GateConfig};
use serde_json::{Value, json};
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

pub const REALM_PATH: &str = "/realms/lab-iam";
pub const DISCOVERY_PATH: &str = "/realms/lab-iam/.well-known/openid-configuration";
pub const CERTS_PATH: &str = "/realms/lab-iam/protocol/openid-connect/certs";

pub const PRIMARY_KID: &str = "primary";
pub const ROTATED_KID: &str = "rotated";
pub const PRIMARY_PEM: &[u8] = include_bytes!("../fixtures/signing_primary.pem");
pub const ROTATED_PEM: &[u8] = include_bytes!("../fixtures/signing_rotated.pem");
pub const PRIMARY_N: &str = "yeB0_VjUwcmh6pStV-qyIpbkuOHjHTGkUwqwqzpaJS8jAwhvL6WvYp5l5OFx2n1t0LcXcHVo3k4GOdYZxEQjAEiasw-Nr6gowxbYvewfdcjEamdnZeMTYQ-MXckLEsbTbZR3G8B1z4aF0ESpO6fz45ceeHSVRy711tdvaSN9v9Q6rZB4Dza3P_3G5FsScx9zKulHTMTEx3EZh24KqTfJkuFO_gCLJQEWubi_nRU9pT8996RgcqFwjUopUJpB_rnwG3hUfSzz02ModDqj5E3tWj2PBzi_Zjjl_KtwPUGq_wS-YZKMetaXrTzQKm3WrrqG2IPh4cSLMySvHcr3pfSHjw";
pub const ROTATED_N: &str = "mnoYZ7jHh0bapPUE-TBTnzBJd5BjNc02vFFGxsHwYL-DcLcLhR-LZDcNVSh047n-zfkAnDKamIe_yF1U6XyD2KC90WK7mA54rIz4I1E88hODm8gHG-1e8LjcSBxMbBUGzs1GiD_08pTfwaFOICYCBZz-M_s4IrbpXPCUcVEuYvFTykVkDN8P84A8Elx0-IDmsbRGxkxesA0y6cbEglBI3n0k0tx_IKF5xK7cf98nle1BwxxTTbYI6HLhKWa1pTw7bK35lVX7c6QPXDKLfiBmbeajhw4LxQnAewFyBUHUHbddV-4950FFENNOLDqYypyHbDzl-ELbcmDIhtIcjPJ88Q";

/// Keycloak-shaped identity provider on a local mock server.
pub struct MockIdp {
	pub server: MockServer,
}
impl MockIdp {
	pub async fn start() -> Self {
		let _ = tracing_subscriber::fmt::try_init();

		Self { server: MockServer::start().await }
	}

	pub fn issuer(&self) -> String {
		format!("{}{REALM_PATH}", self.server.uri())
	}

	pub fn jwks_url(&self) -> String {
		format!("{}{CERTS_PATH}", self.server.uri())
	}

	/// Gate configuration trusting this provider over plain HTTP.
	pub fn config(&self) -> GateConfig {
		GateConfig::new(self.issuer())
			.with_require_https(false)
			.with_http_timeout(Duration::from_secs(2))
	}

	pub fn gate(&self) -> Gate {
		Gate::new(self.config()).expect("gate")
	}

	/// Serve the discovery document, expecting `times` requests.
	pub async fn mount_discovery(&self, times: u64) {
		Mock::given(method("GET"))
			.and(path(DISCOVERY_PATH))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"issuer": self.issuer(),
				"jwks_uri": self.jwks_url(),
				"authorization_endpoint": format!("{}/protocol/openid-connect/auth", self.issuer()),
			})))
			.expect(times)
			.named("discovery")
			.mount(&self.server)
			.await;
	}

	/// Serve `keys` from the certs endpoint, expecting `times` requests.
	pub async fn mount_jwks(&self, keys: Value, times: u64) {
		Mock::given(method("GET"))
			.and(path(CERTS_PATH))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
			.expect(times)
			.named("jwks")
			.mount(&self.server)
			.await;
	}

	/// Serve `keys` for the first `times` requests only, letting later mocks answer afterwards.
	pub async fn mount_jwks_once(&self, keys: Value, times: u64) {
		Mock::given(method("GET"))
			.and(path(CERTS_PATH))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
			.up_to_n_times(times)
			.expect(times)
			.named("jwks (initial)")
			.mount(&self.server)
			.await;
	}

	pub async fn requests_to(&self, endpoint: &str) -> usize {
		self.server
			.received_requests()
			.await
			.unwrap_or_default()
			.iter()
			.filter(|request| request.url.path() == endpoint)
			.count()
	}
}

pub fn rsa_jwk(kid: &str, modulus: &str) -> Value {
	json!({
		"kty": "RSA",
		"kid": kid,
		"use": "sig",
		"alg": "RS256",
		"n": modulus,
		"e": "AQAB",
	})
}

pub fn primary_keys() -> Value {
	json!([rsa_jwk(PRIMARY_KID, PRIMARY_N)])
}

pub fn rotated_keys() -> Value {
	json!([rsa_jwk(PRIMARY_KID, PRIMARY_N), rsa_jwk(ROTATED_KID, ROTATED_N)])
}

pub fn now() -> u64 {
	jsonwebtoken::get_current_timestamp()
}

/// Claims of a valid token for `issuer` carrying `roles`.
pub fn claims(issuer: &str, roles: &[&str]) -> Value {
	json!({
		"iss": issuer,
		"sub": "3f2a6c1e-analyst",
		"iat": now(),
		"exp": now() + 300,
		"azp": "lab-frontend",
		"realm_access": { "roles": roles },
	})
}

pub fn sign(kid: &str, pem: &[u8], claims: &Value) -> String {
	sign_with(Algorithm::RS256, kid, &EncodingKey::from_rsa_pem(pem).expect("pem"), claims)
}

pub fn sign_with(alg: Algorithm, kid: &str, key: &EncodingKey, claims: &Value) -> String {
	let mut header = Header::new(alg);

	header.kid = Some(kid.to_owned());

	jsonwebtoken::encode(&header, claims, key).expect("token")
}

pub fn bearer(token: &str) -> String {
	format!("Bearer {token}")
}
