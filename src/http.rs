//! HTTP helpers for OIDC discovery and JWKS retrieval.

pub mod client;
pub mod discovery;
