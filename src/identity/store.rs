//! Credential store plugin interface and the in-memory backend.
//!
//! Backends speak their own native protocol; the chain only sees the capability set below
//! and the closed `StoreError` result tag. A backend must never report success for a lookup
//! it could not complete.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{anyhow, Context};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use password_hash::{PasswordHash, SaltString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::credential::{Credential, CredentialProvider};
use super::principal::{SsoRole, SsoUser, UserKey};

/// Expected per-backend failure kinds. Anything else is a bug and is not caught by the chain.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such user")]
    NotFound,
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("malformed data: {0}")]
    Malformed(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    fn name(&self) -> &str;
    async fn resolve_identity(&self, key: &UserKey) -> StoreResult<SsoUser>;
    async fn resolve_roles(&self, key: &UserKey) -> StoreResult<Vec<SsoRole>>;
    async fn load_credentials(&self, key: &UserKey, provider: &dyn CredentialProvider) -> StoreResult<Vec<Credential>>;
    async fn load_uid(&self, key: &UserKey, provider: &dyn CredentialProvider) -> StoreResult<String>;
    /// Check `secret` against the stored credential. `Ok(false)` means the user exists here
    /// but the secret does not match.
    async fn bind(&self, username: &str, secret: &str) -> StoreResult<bool>;
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

/// User entry as written in config or a users file. Plaintext `password` is hashed at load
/// and never kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub name: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub domain_controller: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    users: Vec<UserRecord>,
}

#[derive(Debug, Clone)]
struct StoredUser {
    name: String,
    password_hash: Option<String>,
    roles: Vec<String>,
    properties: BTreeMap<String, String>,
    domain_controller: Option<String>,
}

/// Identity store held entirely in memory. Lookups are case-sensitive on the user name.
#[derive(Debug, Clone)]
pub struct MemoryIdentityStore {
    name: String,
    users: HashMap<String, StoredUser>,
}

impl MemoryIdentityStore {
    pub fn from_records(name: impl Into<String>, records: Vec<UserRecord>) -> anyhow::Result<Self> {
        let name = name.into();
        let mut users = HashMap::with_capacity(records.len());
        for rec in records {
            let password_hash = match (rec.password_hash, rec.password) {
                (Some(h), _) => {
                    PasswordHash::new(&h).map_err(|e| anyhow!("user '{}': bad password_hash: {}", rec.name, e))?;
                    Some(h)
                }
                (None, Some(pw)) => Some(hash_password(&pw)?),
                (None, None) => None,
            };
            users.insert(rec.name.clone(), StoredUser {
                name: rec.name,
                password_hash,
                roles: rec.roles,
                properties: rec.properties,
                domain_controller: rec.domain_controller,
            });
        }
        tracing::debug!(target: "ssoward::chain", store = %name, users = users.len(), "memory store loaded");
        Ok(Self { name, users })
    }

    /// Load users from a JSON file of the form `{"users": [ ... ]}`.
    pub fn from_json_file(name: impl Into<String>, path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading users file {}", path.display()))?;
        let file: UsersFile = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing users file {}", path.display()))?;
        Self::from_records(name, file.users)
    }

    pub fn len(&self) -> usize { self.users.len() }
    pub fn is_empty(&self) -> bool { self.users.is_empty() }

    fn user(&self, key: &str) -> StoreResult<&StoredUser> {
        self.users.get(key).ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CredentialStore for MemoryIdentityStore {
    fn name(&self) -> &str { &self.name }

    async fn resolve_identity(&self, key: &UserKey) -> StoreResult<SsoUser> {
        let u = self.user(key.as_str())?;
        Ok(SsoUser { name: u.name.clone(), properties: u.properties.clone() })
    }

    async fn resolve_roles(&self, key: &UserKey) -> StoreResult<Vec<SsoRole>> {
        let u = self.user(key.as_str())?;
        Ok(u.roles.iter().map(SsoRole::new).collect())
    }

    async fn load_credentials(&self, key: &UserKey, provider: &dyn CredentialProvider) -> StoreResult<Vec<Credential>> {
        let u = self.user(key.as_str())?;
        let raw: [(&str, Option<&str>); 3] = [
            ("username", Some(u.name.as_str())),
            ("password", u.password_hash.as_deref()),
            ("domainController", u.domain_controller.as_deref()),
        ];
        Ok(raw.iter().filter_map(|(n, v)| provider.new_credential(n, *v)).collect())
    }

    async fn load_uid(&self, key: &UserKey, _provider: &dyn CredentialProvider) -> StoreResult<String> {
        Ok(self.user(key.as_str())?.name.clone())
    }

    async fn bind(&self, username: &str, secret: &str) -> StoreResult<bool> {
        let u = self.user(username)?;
        let Some(phc) = u.password_hash.clone() else {
            return Ok(false);
        };
        // Argon2 is CPU bound; off the runtime so the chain's store timeout still applies.
        let secret = secret.to_string();
        tokio::task::spawn_blocking(move || verify_password(&phc, &secret))
            .await
            .map_err(|e| StoreError::Unavailable(format!("password verification task failed: {}", e)))
    }
}
