//! Durable account storage boundary
//!
//! Persistence mechanics live behind [`AccountStore`]; the engine only ever
//! sees loaded accounts and asks for them to be saved back. The in-memory
//! implementation is the reference store used by tests and embedders; it
//! keeps each token set in its encoded wire form so every round-trip
//! exercises the versioned codec.

use std::collections::HashMap;

use async_trait::async_trait;
use keywheel_core::TokenSet;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::account::Account;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,

    #[error("token set document could not be encoded or decoded: {0}")]
    Codec(String),

    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Durable account storage.
///
/// Implementations may suspend or block; callers hold the per-account lock
/// across the load-mutate-persist sequence, so a persisted state never
/// exceeds the device ceiling and never contains expired records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look up an account by `(provider, uid)`.
    async fn load(&self, provider: &str, uid: &str) -> StoreResult<Option<Account>>;

    /// Save an account, replacing any existing row.
    async fn persist(&self, account: &Account) -> StoreResult<()>;
}

/// Stored row. The token set stays in its persisted wire form.
#[derive(Debug, Clone)]
struct StoredAccount {
    id: Uuid,
    provider: String,
    uid: String,
    tokens_document: String,
}

/// In-memory reference store.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    rows: RwLock<HashMap<(String, String), StoredAccount>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn load(&self, provider: &str, uid: &str) -> StoreResult<Option<Account>> {
        let rows = self.rows.read().await;
        let Some(row) = rows.get(&(provider.to_owned(), uid.to_owned())) else {
            return Ok(None);
        };
        let tokens = TokenSet::decode(&row.tokens_document)
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        Ok(Some(Account {
            id: row.id,
            provider: row.provider.clone(),
            uid: row.uid.clone(),
            tokens,
        }))
    }

    async fn persist(&self, account: &Account) -> StoreResult<()> {
        let tokens_document = account
            .tokens
            .encode()
            .map_err(|e| StoreError::Codec(e.to_string()))?;
        self.rows.write().await.insert(
            (account.provider.clone(), account.uid.clone()),
            StoredAccount {
                id: account.id,
                provider: account.provider.clone(),
                uid: account.uid.clone(),
                tokens_document,
            },
        );
        Ok(())
    }
}
