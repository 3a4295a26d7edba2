use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Principal;

/// Opaque, unguessable session identifier. Never reused within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub(crate) String);

impl SessionId {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self { SessionId(s.to_string()) }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self { SessionId(s) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Expired,
    LoggedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool { !matches!(self, SessionState::Active) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyReason {
    /// Idle or absolute timeout.
    Expired,
    /// Explicit logout at the authority.
    Logout,
    /// A partner app's container session ended.
    LocalLogout,
    /// Registry teardown with force-expire.
    Shutdown,
}

impl DestroyReason {
    pub fn terminal_state(&self) -> SessionState {
        match self {
            DestroyReason::Expired => SessionState::Expired,
            DestroyReason::Logout | DestroyReason::LocalLogout | DestroyReason::Shutdown => SessionState::LoggedOut,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyReason::Expired => "expired",
            DestroyReason::Logout => "logout",
            DestroyReason::LocalLogout => "local_logout",
            DestroyReason::Shutdown => "shutdown",
        }
    }
}

/// Authoritative session record. Only the registry holds the live copy; everything handed
/// out is a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalSession {
    pub id: SessionId,
    pub principal: Principal,
    pub remote_host: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub idle_timeout: Duration,
    pub absolute_timeout: Duration,
    pub bound_apps: BTreeSet<String>,
    pub state: SessionState,
}

pub(crate) fn elapsed_since(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).to_std().unwrap_or(Duration::ZERO)
}

impl GlobalSession {
    /// Past idle or absolute timeout at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        elapsed_since(now, self.last_access) >= self.idle_timeout
            || elapsed_since(now, self.created_at) >= self.absolute_timeout
    }

    pub fn is_bound_to(&self, partner_app: &str) -> bool { self.bound_apps.contains(partner_app) }
}

/// Single-use, time-boxed token naming one session and one intended partner app.
#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: String,
    pub session_id: SessionId,
    pub partner_app: String,
    pub issued_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl Ticket {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        elapsed_since(now, self.issued_at) >= self.ttl
    }
}
