//! Salted token hashing and verification
//!
//! Secrets are stored only as argon2 PHC strings. Verification is memoized
//! in a bounded process-wide cache because the same `(hash, secret)` pair is
//! checked repeatedly when a client fires bursts of requests with one token.

use std::collections::HashMap;

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use parking_lot::Mutex;

use crate::error::{AuthError, AuthResult};

/// Maximum number of memoized verification results.
/// SOC 2 CC6.1: bounds memory if an attacker feeds unique tokens. When the
/// bound is crossed the whole table is dropped rather than evicted
/// entry-by-entry; the next check simply pays the hashing cost again.
pub const MATCH_CACHE_MAX_ENTRIES: usize = 10_000;

/// Hash a plaintext token secret into a salted argon2 PHC string.
pub fn hash_token(secret: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// Bounded memoization table for verification results.
///
/// Kept separate from [`TokenMatcher`] so the bound can be exercised in
/// tests without doing any argon2 work.
#[derive(Debug, Default)]
pub(crate) struct MatchCache {
    entries: HashMap<(String, String), bool>,
}

impl MatchCache {
    pub(crate) fn get(&self, stored_hash: &str, candidate: &str) -> Option<bool> {
        self.entries
            .get(&(stored_hash.to_owned(), candidate.to_owned()))
            .copied()
    }

    pub(crate) fn insert(&mut self, stored_hash: String, candidate: String, matched: bool) {
        self.entries.insert((stored_hash, candidate), matched);
        if self.entries.len() > MATCH_CACHE_MAX_ENTRIES {
            tracing::debug!(
                entries = self.entries.len(),
                "match cache over capacity, clearing"
            );
            self.entries.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Verifies presented token secrets against stored salted hashes.
///
/// One matcher is shared per process; the cache and its clear-when-oversized
/// policy sit behind a single mutex, so clearing is atomic with respect to
/// concurrent inserts.
#[derive(Debug, Default)]
pub struct TokenMatcher {
    cache: Mutex<MatchCache>,
}

impl TokenMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check `candidate` against `stored_hash`.
    ///
    /// Fails closed: a stored hash that does not parse as a PHC string
    /// yields `false`, never an error or a panic.
    pub fn matches(&self, stored_hash: &str, candidate: &str) -> bool {
        if let Some(hit) = self.cache.lock().get(stored_hash, candidate) {
            return hit;
        }

        let matched = match PasswordHash::new(stored_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(candidate.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored token hash is malformed, treating as non-match");
                false
            }
        };

        self.cache
            .lock()
            .insert(stored_hash.to_owned(), candidate.to_owned(), matched);
        matched
    }

    #[cfg(test)]
    pub(crate) fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}
