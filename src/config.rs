//! Runtime configuration: JSON file plus environment overrides.
//! Every section has documented defaults so an empty `{}` file is valid apart from the
//! store list, which must name at least one backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{SsoError, SsoResult};
use crate::identity::{CredentialChain, CredentialStore, MemoryIdentityStore, UserRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub idle_timeout_ms: u64,
    pub absolute_timeout_ms: u64,
    /// Tickets are meant to be redeemed within seconds of issuance.
    pub ticket_ttl_ms: u64,
    pub reaper_interval_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30 * 60 * 1000,
            absolute_timeout_ms: 8 * 60 * 60 * 1000,
            ticket_ttl_ms: 30_000,
            reaper_interval_ms: 5_000,
        }
    }
}

impl RegistryConfig {
    pub fn idle_timeout(&self) -> Duration { Duration::from_millis(self.idle_timeout_ms) }
    pub fn absolute_timeout(&self) -> Duration { Duration::from_millis(self.absolute_timeout_ms) }
    pub fn ticket_ttl(&self) -> Duration { Duration::from_millis(self.ticket_ttl_ms) }
    pub fn reaper_interval(&self) -> Duration { Duration::from_millis(self.reaper_interval_ms.max(1)) }
}

/// One backend in the credential chain. Options beyond `kind` are backend-specific.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory {
        name: String,
        #[serde(default)]
        users: Vec<UserRecord>,
    },
    JsonFile {
        name: String,
        path: PathBuf,
    },
}

impl StoreConfig {
    pub fn name(&self) -> &str {
        match self {
            StoreConfig::Memory { name, .. } | StoreConfig::JsonFile { name, .. } => name,
        }
    }

    pub fn build(&self) -> anyhow::Result<Arc<dyn CredentialStore>> {
        let store = match self {
            StoreConfig::Memory { name, users } => MemoryIdentityStore::from_records(name.clone(), users.clone())?,
            StoreConfig::JsonFile { name, path } => MemoryIdentityStore::from_json_file(name.clone(), path)?,
        };
        Ok(Arc::new(store))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChainConfig {
    /// Upper bound for a single backend call; a slower store counts as failed.
    pub store_timeout_ms: u64,
    pub stores: Vec<StoreConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self { Self { store_timeout_ms: 2_000, stores: Vec::new() } }
}

impl ChainConfig {
    pub fn store_timeout(&self) -> Duration { Duration::from_millis(self.store_timeout_ms) }

    pub fn build(&self) -> anyhow::Result<CredentialChain> {
        let mut stores = Vec::with_capacity(self.stores.len());
        for sc in &self.stores {
            stores.push(sc.build().with_context(|| format!("building credential store '{}'", sc.name()))?);
        }
        Ok(CredentialChain::new(stores, self.store_timeout())?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartnerAppConfig {
    pub id: String,
    /// Endpoint receiving `POST {"session_id": ..}` when a bound session is destroyed.
    #[serde(default)]
    pub invalidation_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SsoConfig {
    pub http_port: u16,
    pub registry: RegistryConfig,
    pub chain: ChainConfig,
    pub partner_apps: Vec<PartnerAppConfig>,
    pub audit: Option<AuditConfig>,
    pub login_failure_threshold: u32,
    /// Failure counts older than this are forgotten.
    pub login_failure_window_ms: u64,
    /// Upper bound on principals tracked by the failure monitor.
    pub login_failure_capacity: usize,
    pub notify_timeout_ms: u64,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            http_port: 7880,
            registry: RegistryConfig::default(),
            chain: ChainConfig::default(),
            partner_apps: Vec::new(),
            audit: None,
            login_failure_threshold: 5,
            login_failure_window_ms: 15 * 60 * 1000,
            login_failure_capacity: 10_000,
            notify_timeout_ms: 3_000,
        }
    }
}

fn env_u64(name: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) => Ok(Some(v.trim().parse::<u64>().with_context(|| format!("{}='{}' is not a number", name, v))?)),
        Err(_) => Ok(None),
    }
}

impl SsoConfig {
    /// Load from an optional JSON file, apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let bytes = std::fs::read(p).with_context(|| format!("reading config {}", p.display()))?;
                serde_json::from_slice::<SsoConfig>(&bytes).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => SsoConfig::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Some(port) = env_u64("SSOWARD_HTTP_PORT")? {
            self.http_port = u16::try_from(port).context("SSOWARD_HTTP_PORT out of range")?;
        }
        if let Some(ms) = env_u64("SSOWARD_IDLE_TIMEOUT_MS")? { self.registry.idle_timeout_ms = ms; }
        if let Some(ms) = env_u64("SSOWARD_TICKET_TTL_MS")? { self.registry.ticket_ttl_ms = ms; }
        Ok(())
    }

    pub fn validate(&self) -> SsoResult<()> {
        if self.chain.stores.is_empty() {
            return Err(SsoError::config("chain.stores must name at least one credential store"));
        }
        let mut seen = HashSet::new();
        for app in &self.partner_apps {
            if !seen.insert(app.id.as_str()) {
                return Err(SsoError::config(format!("duplicate partner app id '{}'", app.id)));
            }
        }
        if self.registry.ticket_ttl_ms == 0 {
            return Err(SsoError::config("registry.ticket_ttl_ms must be positive"));
        }
        Ok(())
    }

    pub fn notify_timeout(&self) -> Duration { Duration::from_millis(self.notify_timeout_ms) }
    pub fn login_failure_window(&self) -> Duration { Duration::from_millis(self.login_failure_window_ms) }
}

#[cfg(test)]
mod config_tests;
