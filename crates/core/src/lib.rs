// Core crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Keywheel token lifecycle engine
//!
//! Issues and validates per-device session tokens for authenticated
//! accounts: multiple concurrent devices per account, rotation on every
//! authenticated request, a short reuse window that tolerates concurrent
//! requests racing a rotation, bounded device counts, and automatic expiry
//! of stale sessions.
//!
//! This crate is synchronous and in-memory. Durable persistence and account
//! lookup live behind the traits in `keywheel-account`.

pub mod config;
pub mod error;
pub mod hash;
pub mod headers;
pub mod lifecycle;
pub mod policy;
pub mod record;

#[cfg(test)]
mod edge_case_tests;

pub use config::{AuthConfig, HeaderNames};
pub use error::{AuthError, AuthResult};
pub use hash::{hash_token, TokenMatcher};
pub use headers::{
    build_auth_headers, build_auth_url, extract_presented_token, AuthHeaders, PresentedToken,
    ProviderContext,
};
pub use lifecycle::{urlsafe_token, IssueOptions, IssuedToken, RotatedToken, TokenManager};
pub use record::{TokenRecord, TokenSet, TOKEN_SET_SCHEMA_VERSION};
