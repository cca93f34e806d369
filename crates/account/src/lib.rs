// Account crate clippy configuration
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Account-side collaborators for the keywheel token engine
//!
//! The engine in `keywheel-core` is pure and in-memory; this crate supplies
//! everything that touches the outside world at its interface boundary:
//! the account model, the durable-store trait (with an in-memory reference
//! implementation), the provider finder registry, and the request-facing
//! [`AuthService`] that serializes the sweep, rotate, evict, persist
//! sequence per account.

pub mod account;
pub mod finder;
pub mod service;
pub mod store;

pub use account::Account;
pub use finder::{AccountFinder, FinderRegistry};
pub use service::{AuthService, ServiceError, ServiceResult, SignIn};
pub use store::{AccountStore, InMemoryAccountStore, StoreError, StoreResult};
