//! Cache freshness, single-flight refresh, and failure handling.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use realm_gate::{CacheFreshness, Error, Gate, JwksCache, RequiredRoles, Rejection, Result};
use wiremock::{
	Mock, ResponseTemplate,
	matchers::{method, path},
};
// self
use crate::support::*;

#[tokio::test]
async fn validations_within_ttl_reuse_the_cached_key_set() -> Result<()> {
	let idp = MockIdp::start().await;

	idp.mount_discovery(2).await;
	idp.mount_jwks(primary_keys(), 2).await;

	let cache = JwksCache::new(&idp.config())?;
	let first = cache.get_keys(false).await?;
	let second = cache.get_keys(false).await?;

	assert!(Arc::ptr_eq(&first, &second));

	let gate = idp.gate();
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &claims(&idp.issuer(), &["analyst"]));

	for _ in 0..5 {
		gate.authenticate(Some(&bearer(&token))).await?;
	}

	// The gate owns a separate cache, hence the second fetch overall.
	assert_eq!(idp.requests_to(CERTS_PATH).await, 2);

	let status = gate.status().await;

	assert_eq!(status.state, CacheFreshness::Fresh);
	assert_eq!(status.metrics.lookups, 5);
	assert_eq!(status.metrics.hits, 4);
	assert_eq!(status.jwks_uri.map(String::from), Some(idp.jwks_url()));
	assert!(status.last_refresh.is_some());
	assert!(status.expires_at > status.last_refresh);

	Ok(())
}

#[tokio::test]
async fn concurrent_requests_after_expiry_trigger_one_fetch() -> Result<()> {
	let idp = MockIdp::start().await;

	idp.mount_discovery(2).await;

	Mock::given(method("GET"))
		.and(path(CERTS_PATH))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(serde_json::json!({ "keys": primary_keys() }))
				.set_delay(Duration::from_millis(150)),
		)
		.expect(2)
		.mount(&idp.server)
		.await;

	let gate = Gate::new(idp.config().with_cache_ttl(Duration::from_millis(300)))?;
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &claims(&idp.issuer(), &["analyst"]));

	gate.authenticate(Some(&bearer(&token))).await?;

	tokio::time::sleep(Duration::from_millis(400)).await;

	assert_eq!(gate.status().await.state, CacheFreshness::Stale);

	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let gate = gate.clone();
			let header = bearer(&token);

			tokio::spawn(async move { gate.authenticate(Some(&header)).await })
		})
		.collect();

	for task in tasks {
		task.await.expect("join")?;
	}

	assert_eq!(idp.requests_to(CERTS_PATH).await, 2);

	let metrics = gate.status().await.metrics;

	assert_eq!(metrics.refreshes, 2);
	assert_eq!(metrics.coalesced, 15);

	Ok(())
}

#[tokio::test]
async fn failed_refresh_keeps_the_previous_key_set() -> Result<()> {
	let idp = MockIdp::start().await;

	idp.mount_discovery(2).await;
	idp.mount_jwks_once(primary_keys(), 1).await;

	Mock::given(method("GET"))
		.and(path(CERTS_PATH))
		.respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
		.expect(1)
		.mount(&idp.server)
		.await;

	let gate = Gate::new(idp.config().with_cache_ttl(Duration::from_millis(200)))?;
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &claims(&idp.issuer(), &["admin"]));

	gate.authenticate(Some(&bearer(&token))).await?;

	tokio::time::sleep(Duration::from_millis(300)).await;

	let err = gate.authenticate(Some(&bearer(&token))).await.expect_err("fetch failure");

	assert!(matches!(err, Error::JwksFetch { .. }));
	assert!(err.is_upstream());

	let status = gate.status().await;

	assert_eq!(status.state, CacheFreshness::Stale);
	assert_eq!(status.key_ids, vec![PRIMARY_KID.to_string()]);
	assert_eq!(status.consecutive_failures, 1);
	assert!(status.last_error.as_deref().is_some_and(|error| error.contains("503")));

	Ok(())
}

#[tokio::test]
async fn upstream_outage_is_reported_as_unauthenticated() {
	let idp = MockIdp::start().await;

	idp.mount_discovery(1).await;

	Mock::given(method("GET"))
		.and(path(CERTS_PATH))
		.respond_with(ResponseTemplate::new(500))
		.expect(1)
		.mount(&idp.server)
		.await;

	let gate = idp.gate();
	let token = sign(PRIMARY_KID, PRIMARY_PEM, &claims(&idp.issuer(), &["admin"]));
	let outcome =
		gate.authorize_request(Some(&bearer(&token)), &RequiredRoles::any_of(["admin"])).await;

	assert_eq!(outcome, Err(Rejection::Unauthenticated));
}

#[tokio::test]
async fn slow_providers_hit_the_request_timeout() {
	let idp = MockIdp::start().await;

	idp.mount_discovery(1).await;

	Mock::given(method("GET"))
		.and(path(CERTS_PATH))
		.respond_with(
			ResponseTemplate::new(200)
				.set_body_json(serde_json::json!({ "keys": primary_keys() }))
				.set_delay(Duration::from_secs(2)),
		)
		.mount(&idp.server)
		.await;

	let cache = JwksCache::new(&idp.config().with_http_timeout(Duration::from_millis(200)))
		.expect("cache");
	let err = cache.get_keys(false).await.expect_err("timeout");

	assert!(matches!(err, Error::JwksFetch { .. }), "{err}");
}

#[tokio::test]
async fn oversized_documents_are_refused() {
	let idp = MockIdp::start().await;

	idp.mount_discovery(1).await;
	idp.mount_jwks(rotated_keys(), 0).await;

	let mut config = idp.config();

	config.max_response_bytes = 64;

	let cache = JwksCache::new(&config).expect("cache");

	assert!(matches!(cache.get_keys(false).await, Err(Error::Discovery { .. })));
}

#[tokio::test]
async fn warm_up_failure_is_deferred_to_the_first_request() -> Result<()> {
	let idp = MockIdp::start().await;

	Mock::given(method("GET"))
		.and(path(DISCOVERY_PATH))
		.respond_with(ResponseTemplate::new(503))
		.up_to_n_times(1)
		.expect(1)
		.mount(&idp.server)
		.await;

	idp.mount_discovery(1).await;
	idp.mount_jwks(primary_keys(), 1).await;

	let gate = idp.gate();

	gate.warm_up().await;

	let status = gate.status().await;

	assert_eq!(status.state, CacheFreshness::Empty);
	assert_eq!(status.consecutive_failures, 1);

	let token = sign(PRIMARY_KID, PRIMARY_PEM, &claims(&idp.issuer(), &["admin"]));

	gate.authenticate(Some(&bearer(&token))).await?;

	assert_eq!(gate.status().await.consecutive_failures, 0);

	Ok(())
}
