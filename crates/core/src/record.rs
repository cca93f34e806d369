//! Per-account device session records
//!
//! One [`TokenRecord`] per logged-in device, collected in a [`TokenSet`]
//! owned by the account. The set is only mutated through the lifecycle and
//! policy operations in this crate; callers get read access and the
//! versioned persisted-layout codec.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{AuthError, AuthResult};

/// Version tag written into every persisted token set document.
pub const TOKEN_SET_SCHEMA_VERSION: u32 = 1;

/// A single device session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Salted hash of the live secret. Never plaintext.
    pub token_hash: String,

    /// Instant after which the current secret stops validating.
    /// Persisted as integer epoch seconds.
    #[serde(with = "time::serde::timestamp")]
    pub expiry: OffsetDateTime,

    /// Hash this device held immediately before the last rotation. Absent
    /// until the first rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_token_hash: Option<String>,

    /// When the record was last rotated or had its reuse window extended.
    /// Absent until the first rotation; bounds the reuse window.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

/// All live device sessions for one account, keyed by device id.
///
/// Backed by a `BTreeMap` so iteration order is deterministic; the
/// eviction tie-break and the credential-change keep rule depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSet {
    devices: BTreeMap<String, TokenRecord>,
}

impl TokenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&TokenRecord> {
        self.devices.get(device_id)
    }

    pub fn contains_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Device ids in ascending order.
    pub fn device_ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TokenRecord)> {
        self.devices.iter()
    }

    pub(crate) fn insert(&mut self, device_id: String, record: TokenRecord) -> Option<TokenRecord> {
        self.devices.insert(device_id, record)
    }

    pub(crate) fn remove(&mut self, device_id: &str) -> Option<TokenRecord> {
        self.devices.remove(device_id)
    }

    pub(crate) fn get_mut(&mut self, device_id: &str) -> Option<&mut TokenRecord> {
        self.devices.get_mut(device_id)
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&String, &mut TokenRecord) -> bool) {
        self.devices.retain(f);
    }

    pub(crate) fn clear(&mut self) {
        self.devices.clear();
    }

    /// Encode into the versioned persisted layout.
    pub fn encode(&self) -> AuthResult<String> {
        let document = PersistedTokenSet {
            version: TOKEN_SET_SCHEMA_VERSION,
            devices: self.devices.clone(),
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Decode a persisted document. Unknown versions and malformed
    /// documents are errors at the store boundary; they never panic and
    /// never reach validation.
    pub fn decode(document: &str) -> AuthResult<Self> {
        let parsed: PersistedTokenSet = serde_json::from_str(document)?;
        if parsed.version != TOKEN_SET_SCHEMA_VERSION {
            return Err(AuthError::UnsupportedVersion {
                found: parsed.version,
                expected: TOKEN_SET_SCHEMA_VERSION,
            });
        }
        Ok(Self {
            devices: parsed.devices,
        })
    }
}

/// Wire form of a persisted token set.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedTokenSet {
    version: u32,
    devices: BTreeMap<String, TokenRecord>,
}
