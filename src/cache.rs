//! JWKS cache: payload, entry bookkeeping, and the single-flight manager.

pub mod entry;
pub mod manager;
pub mod state;
