//! The account model
//!
//! Accounts hold their device token set by explicit composition; all token
//! mutation goes through the engine operations, never through the field
//! directly.

use keywheel_core::{ProviderContext, TokenSet};
use uuid::Uuid;

/// An authenticated account, referenced by `(provider, uid)`.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: Uuid,
    /// Identity provider that owns the uid ("email", "ldap", ...).
    pub provider: String,
    /// Provider-specific identity (an email address for the email provider).
    pub uid: String,
    /// Live device sessions.
    pub tokens: TokenSet,
}

impl Account {
    pub fn new(provider: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            uid: uid.into(),
            tokens: TokenSet::new(),
        }
    }

    /// The identity context placed into auth headers for this account.
    pub fn provider_context(&self) -> ProviderContext {
        ProviderContext::new(self.provider.clone(), self.uid.clone())
    }
}
