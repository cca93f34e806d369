//! Error types for the token lifecycle engine
//!
//! Validation deliberately has no error channel; it answers with a bare
//! boolean so callers cannot leak why a token was rejected. The variants
//! here cover configuration, hashing, and the persisted-layout codec.

use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no session exists for this device")]
    DeviceNotFound,

    #[error("token hashing failed: {0}")]
    Hashing(String),

    #[error("token set document is malformed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported token set version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid redirect url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}
