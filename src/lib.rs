//! OIDC bearer-token verification and realm-role authorization, backed by a single-flight JWKS
//! cache with refresh-on-miss for key rotation.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod authz;
pub mod cache;
pub mod claims;
pub mod config;
pub mod gate;
pub mod http;
pub mod key;
pub mod metrics;
pub mod security;
pub mod validator;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;
	pub use url::Url;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	authz::{Decision, RequiredRoles},
	cache::manager::{CacheFreshness, CacheStatus, JwksCache, KeyLookup},
	claims::{Claims, Principal},
	config::{EmptyRolePolicy, GateConfig, JwksSource},
	error::{Error, ForbiddenReason, InvalidTokenReason, Rejection, Result, UpstreamError},
	gate::{Gate, parse_bearer},
};
pub use jsonwebtoken::Algorithm;
