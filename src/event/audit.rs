//! Login audit: records successful logins and session ends through a pluggable sink.
//! Sink failures stay inside the listener; the bus logs them and the login proceeds.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::bus::{EventBus, SsoEventListener};
use super::types::{EventKind, SsoEvent};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub event: String,
    pub principal: String,
    pub session_id: Option<String>,
    pub remote_host: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Persistence boundary. Implementations must tolerate duplicate records.
pub trait AuditSink: Send + Sync {
    fn record(&self, rec: &AuditRecord) -> anyhow::Result<()>;
}

/// Appends one JSON object per line.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, rec: &AuditRecord) -> anyhow::Result<()> {
        let line = serde_json::to_string(rec)?;
        let _guard = self.write_lock.lock();
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening audit log {}", self.path.display()))?;
        writeln!(&mut f, "{}", line)?;
        Ok(())
    }
}

pub struct AuditListener<S> {
    sink: S,
}

impl<S: AuditSink + 'static> AuditListener<S> {
    pub const KINDS: [EventKind; 2] = [EventKind::AuthenticationSucceeded, EventKind::SessionDestroyed];

    pub fn new(sink: S) -> Self { Self { sink } }

    /// Subscribe to login success and session destruction.
    pub fn register(self, bus: &EventBus) -> Arc<Self> {
        let me = Arc::new(self);
        for kind in Self::KINDS {
            bus.subscribe(kind, me.clone());
        }
        me
    }
}

impl<S: AuditSink> SsoEventListener for AuditListener<S> {
    fn name(&self) -> &str { "audit" }

    fn handle_event(&self, event: &SsoEvent) -> anyhow::Result<()> {
        if !matches!(event, SsoEvent::AuthenticationSucceeded { .. } | SsoEvent::SessionDestroyed { .. }) {
            return Ok(());
        }
        let meta = event.meta();
        tracing::debug!(target: "ssoward::events", event = %event.kind(), principal = %meta.principal, "audit record");
        self.sink.record(&AuditRecord {
            event: event.kind().as_str().to_string(),
            principal: meta.principal.clone(),
            session_id: meta.session_id.as_ref().map(|s| s.to_string()),
            remote_host: meta.remote_host.clone(),
            timestamp: meta.timestamp,
        })
    }
}
