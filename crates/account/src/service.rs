//! Request-facing orchestration
//!
//! [`AuthService`] is what request-handling code talks to. It resolves
//! accounts through the finder registry (falling back to the store), takes
//! a per-account lock for the duration of sweep, rotate, evict, persist,
//! and keeps authentication outcomes strictly separate from persistence
//! failures: a bad token is `Ok(None)`, a store failure is
//! `Err(ServiceError::Persistence)`.

use std::collections::HashMap;
use std::sync::Arc;

use keywheel_core::{urlsafe_token, AuthError, AuthHeaders, TokenManager};
use tokio::sync::Mutex;

use crate::account::Account;
use crate::finder::FinderRegistry;
use crate::store::{AccountStore, StoreError};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("account not found")]
    AccountNotFound,

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Tokens handed back after a successful sign-in.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub device_id: String,
    pub headers: AuthHeaders,
}

/// Per-account serialization of token mutations plus durable persistence.
pub struct AuthService {
    manager: TokenManager,
    store: Arc<dyn AccountStore>,
    finders: FinderRegistry,
    /// One lock per `(provider, uid)`, created on first use and held across
    /// the load, mutate, persist sequence.
    account_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl AuthService {
    pub fn new(manager: TokenManager, store: Arc<dyn AccountStore>, finders: FinderRegistry) -> Self {
        Self {
            manager,
            store,
            finders,
            account_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn manager(&self) -> &TokenManager {
        &self.manager
    }

    async fn lock_for(&self, provider: &str, uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.account_locks.lock().await;
        locks
            .entry((provider.to_owned(), uid.to_owned()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Resolve an account through the finder registry, falling back to the
    /// store's `(provider, uid)` lookup.
    async fn resolve_account(&self, provider: &str, uid: &str) -> ServiceResult<Option<Account>> {
        if let Some(finder) = self.finders.resolve(provider) {
            return Ok(finder.find(uid).await?);
        }
        Ok(self.store.load(provider, uid).await?)
    }

    /// Mint a session for a new device after successful authentication.
    ///
    /// Rotates onto a freshly generated device id (the first rotation of a
    /// new device leaves no previous token), then persists.
    pub async fn sign_in(&self, provider: &str, uid: &str) -> ServiceResult<SignIn> {
        let lock = self.lock_for(provider, uid).await;
        let _guard = lock.lock().await;

        let mut account = self
            .resolve_account(provider, uid)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;
        let context = account.provider_context();

        let device_id = urlsafe_token();
        let rotated = self.manager.rotate(&mut account.tokens, &device_id, &context)?;
        self.store.persist(&account).await?;

        tracing::info!(provider = %provider, device_id = %rotated.device_id, "sign-in issued device session");
        Ok(SignIn {
            device_id: rotated.device_id,
            headers: rotated.headers,
        })
    }

    /// Authenticate a request and answer with the headers the caller should
    /// place on its response.
    ///
    /// A current token is rotated; a token inside the reuse window extends
    /// the window and is echoed back; anything else is `Ok(None)` with no
    /// further detail. Only a persistence failure is an `Err`.
    pub async fn authenticate(
        &self,
        provider: &str,
        uid: &str,
        device_id: &str,
        token: &str,
    ) -> ServiceResult<Option<AuthHeaders>> {
        let lock = self.lock_for(provider, uid).await;
        let _guard = lock.lock().await;

        let Some(mut account) = self.resolve_account(provider, uid).await? else {
            return Ok(None);
        };
        let context = account.provider_context();

        if self.manager.token_is_current(&account.tokens, device_id, token) {
            let rotated = self.manager.rotate(&mut account.tokens, device_id, &context)?;
            self.store.persist(&account).await?;
            return Ok(Some(rotated.headers));
        }

        if self.manager.token_can_be_reused(&account.tokens, device_id, token) {
            match self
                .manager
                .extend_reuse_window(&mut account.tokens, device_id, token, &context)
            {
                Ok(headers) => {
                    self.store.persist(&account).await?;
                    return Ok(Some(headers));
                }
                // Session aged out between the check and the extension.
                Err(AuthError::DeviceNotFound) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(provider = %provider, "request token rejected");
        Ok(None)
    }

    /// Read-only validity check; never rotates, never persists.
    pub async fn validate(
        &self,
        provider: &str,
        uid: &str,
        device_id: &str,
        token: &str,
    ) -> ServiceResult<bool> {
        let Some(account) = self.resolve_account(provider, uid).await? else {
            return Ok(false);
        };
        Ok(self.manager.is_valid(&account.tokens, device_id, token))
    }

    /// Apply the credential-change policy: when enabled and a credential
    /// actually changed, every session except the most recently rotated one
    /// is dropped. Returns how many sessions were removed.
    pub async fn change_credentials(
        &self,
        provider: &str,
        uid: &str,
        credential_changed: bool,
    ) -> ServiceResult<usize> {
        let lock = self.lock_for(provider, uid).await;
        let _guard = lock.lock().await;

        let mut account = self
            .resolve_account(provider, uid)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        let removed = self
            .manager
            .reset_after_credential_change(&mut account.tokens, credential_changed);
        match removed {
            Some(removed) => {
                self.store.persist(&account).await?;
                Ok(removed.len())
            }
            None => Ok(0),
        }
    }

    /// Sign out one device. Returns whether a session existed for it.
    pub async fn revoke_device(
        &self,
        provider: &str,
        uid: &str,
        device_id: &str,
    ) -> ServiceResult<bool> {
        let lock = self.lock_for(provider, uid).await;
        let _guard = lock.lock().await;

        let mut account = self
            .resolve_account(provider, uid)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        let existed = self.manager.revoke(&mut account.tokens, device_id);
        if existed {
            self.store.persist(&account).await?;
        }
        Ok(existed)
    }

    /// Sign out every device. Returns how many sessions were removed.
    pub async fn revoke_all(&self, provider: &str, uid: &str) -> ServiceResult<usize> {
        let lock = self.lock_for(provider, uid).await;
        let _guard = lock.lock().await;

        let mut account = self
            .resolve_account(provider, uid)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        let count = self.manager.revoke_all(&mut account.tokens);
        if count > 0 {
            self.store.persist(&account).await?;
        }
        Ok(count)
    }
}
