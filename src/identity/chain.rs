//! Ordered, failover-capable chain of credential stores.
//!
//! Each operation walks the stores in priority order and returns the first success. A store
//! that fails, returns malformed data or exceeds the per-store timeout is logged at debug
//! and skipped; its error never reaches the caller. Only total exhaustion is reported.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{SsoError, SsoResult};

use super::credential::{Credential, CredentialProvider};
use super::principal::{SsoRole, SsoUser, UserKey};
use super::store::{CredentialStore, StoreError, StoreResult};

pub struct CredentialChain {
    stores: Vec<Arc<dyn CredentialStore>>,
    store_timeout: Duration,
}

impl std::fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialChain")
            .field("stores", &self.store_names())
            .field("store_timeout", &self.store_timeout)
            .finish()
    }
}

impl CredentialChain {
    /// An empty store list is a configuration error and is rejected here rather than at
    /// first use.
    pub fn new(stores: Vec<Arc<dyn CredentialStore>>, store_timeout: Duration) -> SsoResult<Self> {
        if stores.is_empty() {
            return Err(SsoError::config("credential chain requires at least one store"));
        }
        Ok(Self { stores, store_timeout })
    }

    pub fn store_names(&self) -> Vec<String> {
        self.stores.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize { self.stores.len() }
    pub fn is_empty(&self) -> bool { self.stores.is_empty() }

    async fn attempt<T, F>(&self, store: &dyn CredentialStore, operation: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let outcome = match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(StoreError::Timeout(self.store_timeout.as_millis() as u64)),
        };
        match outcome {
            Ok(v) => Some(v),
            Err(e) => {
                let err = SsoError::StoreUnavailable { store: store.name().to_string(), reason: e.to_string() };
                debug!(target: "ssoward::chain", operation, "{}; trying next store", err);
                None
            }
        }
    }

    pub async fn resolve_identity(&self, key: &UserKey) -> SsoResult<SsoUser> {
        for store in &self.stores {
            if let Some(user) = self.attempt(store.as_ref(), "resolve identity", store.resolve_identity(key)).await {
                return Ok(user);
            }
        }
        Err(SsoError::AggregateResolutionFailure { operation: "resolve identity" })
    }

    pub async fn resolve_roles(&self, key: &UserKey) -> SsoResult<Vec<SsoRole>> {
        for store in &self.stores {
            if let Some(roles) = self.attempt(store.as_ref(), "resolve roles", store.resolve_roles(key)).await {
                return Ok(roles);
            }
        }
        Err(SsoError::AggregateResolutionFailure { operation: "resolve roles" })
    }

    pub async fn load_credentials(&self, key: &UserKey, provider: &dyn CredentialProvider) -> SsoResult<Vec<Credential>> {
        for store in &self.stores {
            if let Some(creds) = self.attempt(store.as_ref(), "load credentials", store.load_credentials(key, provider)).await {
                return Ok(creds);
            }
        }
        Err(SsoError::AggregateResolutionFailure { operation: "load credentials" })
    }

    pub async fn load_uid(&self, key: &UserKey, provider: &dyn CredentialProvider) -> SsoResult<String> {
        for store in &self.stores {
            if let Some(uid) = self.attempt(store.as_ref(), "load uid", store.load_uid(key, provider)).await {
                return Ok(uid);
            }
        }
        Err(SsoError::AggregateResolutionFailure { operation: "load uid" })
    }

    /// Returns `Ok(true)` as soon as one store accepts the secret. A store that knows the
    /// user but rejects the secret does not stop the walk.
    pub async fn bind(&self, username: &str, secret: &str) -> SsoResult<bool> {
        for store in &self.stores {
            match self.attempt(store.as_ref(), "bind", store.bind(username, secret)).await {
                Some(true) => return Ok(true),
                Some(false) => debug!(target: "ssoward::chain", store = store.name(), "bind rejected; trying next store"),
                None => {}
            }
        }
        Err(SsoError::AuthenticationFailure)
    }
}
