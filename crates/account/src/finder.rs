//! Provider-specific account lookup strategies
//!
//! Some providers resolve identities through something other than the
//! account store (an LDAP directory, a legacy table). The registry maps a
//! provider name to its finder; it is built at startup and handed to the
//! service by reference; there is no process-wide lookup table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::account::Account;
use crate::store::StoreResult;

/// A provider-specific account lookup.
#[async_trait]
pub trait AccountFinder: Send + Sync {
    async fn find(&self, uid: &str) -> StoreResult<Option<Account>>;
}

/// Registry of custom finders keyed by provider name.
///
/// Providers without a registered finder fall back to the store's
/// `(provider, uid)` lookup.
#[derive(Default)]
pub struct FinderRegistry {
    finders: HashMap<String, Arc<dyn AccountFinder>>,
}

impl FinderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, finder: Arc<dyn AccountFinder>) {
        let provider = provider.into();
        tracing::debug!(provider = %provider, "registered account finder");
        self.finders.insert(provider, finder);
    }

    pub fn resolve(&self, provider: &str) -> Option<Arc<dyn AccountFinder>> {
        self.finders.get(provider).cloned()
    }

    pub fn len(&self) -> usize {
        self.finders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finders.is_empty()
    }
}

impl fmt::Debug for FinderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinderRegistry")
            .field("providers", &self.finders.keys().collect::<Vec<_>>())
            .finish()
    }
}
