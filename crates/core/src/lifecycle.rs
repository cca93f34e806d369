//! Token issuance, validation, rotation, and revocation
//!
//! [`TokenManager`] is the engine facade: it holds the configuration and the
//! process-wide [`TokenMatcher`] and applies the sweep/evict policies in the
//! required order (sweep before eviction, eviction before the caller
//! persists). Every time-dependent operation has an `*_at` variant taking an
//! explicit `now` so window and expiry behavior is testable without sleeping.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use time::OffsetDateTime;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::hash::{hash_token, TokenMatcher};
use crate::headers::{build_auth_headers, AuthHeaders, ProviderContext};
use crate::policy;
use crate::record::{TokenRecord, TokenSet};

/// Byte length of generated secrets and device ids before base64 encoding.
const GENERATED_TOKEN_BYTES: usize = 16;

/// Generate a URL-safe random string suitable for a token secret or a
/// device id.
pub fn urlsafe_token() -> String {
    let mut bytes = [0u8; GENERATED_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Expiries are persisted as integer epoch seconds, so the engine only ever
/// stores whole-second instants; otherwise a record would compare unequal
/// to its own persisted form.
fn whole_seconds(instant: OffsetDateTime) -> OffsetDateTime {
    instant.replace_nanosecond(0).unwrap_or(instant)
}

/// Inputs for [`TokenManager::issue`]. Anything left `None` is generated or
/// defaulted.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub device_id: Option<String>,
    pub secret: Option<String>,
    pub expiry: Option<OffsetDateTime>,
}

/// A freshly issued device session.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub device_id: String,
    /// The plaintext secret. Hand it to the client; only its hash is kept.
    pub secret: String,
    pub expiry: OffsetDateTime,
}

/// Result of a rotation: the new plaintext secret plus the header set the
/// caller places on its response.
#[derive(Debug, Clone)]
pub struct RotatedToken {
    pub device_id: String,
    pub secret: String,
    pub headers: AuthHeaders,
}

/// Drives the token lifecycle. One per process; shared across accounts.
#[derive(Debug, Default)]
pub struct TokenManager {
    config: AuthConfig,
    matcher: TokenMatcher,
}

impl TokenManager {
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            matcher: TokenMatcher::new(),
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn matcher(&self) -> &TokenMatcher {
        &self.matcher
    }

    /// Create a brand-new device session.
    ///
    /// Sweeps expired sessions first, then writes a record with no previous
    /// hash and no rotation timestamp. Does not evict and does not persist;
    /// the caller decides when to do both.
    pub fn issue(&self, tokens: &mut TokenSet, opts: IssueOptions) -> AuthResult<IssuedToken> {
        self.issue_at(tokens, opts, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        tokens: &mut TokenSet,
        opts: IssueOptions,
        now: OffsetDateTime,
    ) -> AuthResult<IssuedToken> {
        policy::sweep_at(tokens, now);

        let device_id = opts.device_id.unwrap_or_else(urlsafe_token);
        let secret = opts.secret.unwrap_or_else(urlsafe_token);
        let expiry = whole_seconds(opts.expiry.unwrap_or(now + self.config.token_lifespan));

        let token_hash = hash_token(&secret)?;
        tokens.insert(
            device_id.clone(),
            TokenRecord {
                token_hash,
                expiry,
                last_token_hash: None,
                updated_at: None,
            },
        );

        tracing::debug!(device_id = %device_id, "issued new device session");
        Ok(IssuedToken {
            device_id,
            secret,
            expiry,
        })
    }

    /// Is this presented secret acceptable for this device right now?
    ///
    /// True on either the current-token path or the reuse-window path.
    /// Answers with a bare boolean; callers never learn why a token was
    /// rejected.
    pub fn is_valid(&self, tokens: &TokenSet, device_id: &str, presented: &str) -> bool {
        self.is_valid_at(tokens, device_id, presented, OffsetDateTime::now_utc())
    }

    pub fn is_valid_at(
        &self,
        tokens: &TokenSet,
        device_id: &str,
        presented: &str,
        now: OffsetDateTime,
    ) -> bool {
        self.token_is_current_at(tokens, device_id, presented, now)
            || self.token_can_be_reused_at(tokens, device_id, presented, now)
    }

    /// Current-token path: the record exists, has not expired, and the
    /// presented secret matches the live hash.
    pub fn token_is_current(&self, tokens: &TokenSet, device_id: &str, presented: &str) -> bool {
        self.token_is_current_at(tokens, device_id, presented, OffsetDateTime::now_utc())
    }

    pub fn token_is_current_at(
        &self,
        tokens: &TokenSet,
        device_id: &str,
        presented: &str,
        now: OffsetDateTime,
    ) -> bool {
        let Some(record) = tokens.get(device_id) else {
            return false;
        };
        record.expiry > now && self.matcher.matches(&record.token_hash, presented)
    }

    /// Reuse-window path: the previous secret is still accepted for a short
    /// time after rotation, because clients fire concurrent requests with a
    /// token that an earlier response already rotated away.
    ///
    /// Fails closed when either `last_token_hash` or `updated_at` is absent.
    pub fn token_can_be_reused(&self, tokens: &TokenSet, device_id: &str, presented: &str) -> bool {
        self.token_can_be_reused_at(tokens, device_id, presented, OffsetDateTime::now_utc())
    }

    pub fn token_can_be_reused_at(
        &self,
        tokens: &TokenSet,
        device_id: &str,
        presented: &str,
        now: OffsetDateTime,
    ) -> bool {
        let Some(record) = tokens.get(device_id) else {
            return false;
        };
        match (&record.last_token_hash, record.updated_at) {
            (Some(last_hash), Some(updated_at)) => {
                updated_at > now - self.config.batch_request_buffer_throttle
                    && self.matcher.matches(last_hash, presented)
            }
            _ => false,
        }
    }

    /// Rotate the session for a device onto a fresh secret.
    ///
    /// Order matters: sweep, write the new record (carrying the previous
    /// hash into `last_token_hash`), enforce the device ceiling, build the
    /// response headers. The caller persists immediately after.
    ///
    /// Rotating a device with no existing record issues its first token;
    /// `last_token_hash` stays empty in that case.
    pub fn rotate(
        &self,
        tokens: &mut TokenSet,
        device_id: &str,
        context: &ProviderContext,
    ) -> AuthResult<RotatedToken> {
        self.rotate_at(tokens, device_id, context, OffsetDateTime::now_utc())
    }

    pub fn rotate_at(
        &self,
        tokens: &mut TokenSet,
        device_id: &str,
        context: &ProviderContext,
        now: OffsetDateTime,
    ) -> AuthResult<RotatedToken> {
        policy::sweep_at(tokens, now);

        let secret = urlsafe_token();
        let token_hash = hash_token(&secret)?;
        let last_token_hash = tokens.get(device_id).map(|r| r.token_hash.clone());
        let expiry = whole_seconds(now + self.config.token_lifespan);

        tokens.insert(
            device_id.to_owned(),
            TokenRecord {
                token_hash,
                expiry,
                last_token_hash,
                updated_at: Some(now),
            },
        );

        policy::enforce_device_limit(tokens, self.config.max_number_of_devices);

        tracing::debug!(device_id = %device_id, "rotated device session token");
        let headers = build_auth_headers(&secret, device_id, expiry, context);
        Ok(RotatedToken {
            device_id: device_id.to_owned(),
            secret,
            headers,
        })
    }

    /// Keep the reuse window alive for trailing concurrent requests.
    ///
    /// Refreshes only `updated_at` for the existing record; no new secret
    /// is generated; the response headers carry the presented (still
    /// reused) secret.
    pub fn extend_reuse_window(
        &self,
        tokens: &mut TokenSet,
        device_id: &str,
        presented: &str,
        context: &ProviderContext,
    ) -> AuthResult<AuthHeaders> {
        self.extend_reuse_window_at(tokens, device_id, presented, context, OffsetDateTime::now_utc())
    }

    pub fn extend_reuse_window_at(
        &self,
        tokens: &mut TokenSet,
        device_id: &str,
        presented: &str,
        context: &ProviderContext,
        now: OffsetDateTime,
    ) -> AuthResult<AuthHeaders> {
        policy::sweep_at(tokens, now);

        let expiry = {
            let record = tokens.get_mut(device_id).ok_or(AuthError::DeviceNotFound)?;
            record.updated_at = Some(now);
            record.expiry
        };

        policy::enforce_device_limit(tokens, self.config.max_number_of_devices);

        tracing::debug!(device_id = %device_id, "extended reuse window");
        Ok(build_auth_headers(presented, device_id, expiry, context))
    }

    /// Remove one device session (sign-out). Returns whether it existed.
    pub fn revoke(&self, tokens: &mut TokenSet, device_id: &str) -> bool {
        let existed = tokens.remove(device_id).is_some();
        if existed {
            tracing::info!(device_id = %device_id, "revoked device session");
        }
        existed
    }

    /// Remove every device session (global sign-out). Returns the count.
    pub fn revoke_all(&self, tokens: &mut TokenSet) -> usize {
        let count = tokens.len();
        tokens.clear();
        if count > 0 {
            tracing::info!(count, "revoked all device sessions");
        }
        count
    }

    /// Collapse the set to the session that performed a credential change,
    /// if the feature is enabled. Returns the removed device ids.
    pub fn reset_after_credential_change(
        &self,
        tokens: &mut TokenSet,
        credential_changed: bool,
    ) -> Option<Vec<String>> {
        policy::reset_after_credential_change(
            tokens,
            self.config.remove_tokens_after_credential_change,
            credential_changed,
        )
    }
}
