use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::session::{DestroyReason, SessionId};

/// Fields every lifecycle event carries.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventMeta {
    pub id: Uuid,
    pub principal: String,
    pub session_id: Option<SessionId>,
    pub remote_host: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EventMeta {
    pub fn new(principal: impl Into<String>, session_id: Option<SessionId>, remote_host: Option<String>) -> Self {
        Self { id: Uuid::new_v4(), principal: principal.into(), session_id, remote_host, timestamp: Utc::now() }
    }
}

/// Authentication and session lifecycle events. Immutable once built.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SsoEvent {
    SessionCreated { meta: EventMeta },
    SessionDestroyed { meta: EventMeta, reason: DestroyReason },
    AuthenticationSucceeded { meta: EventMeta },
    AuthenticationFailed { meta: EventMeta, reason: String },
    TicketRejected { meta: EventMeta, partner_app: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SessionCreated,
    SessionDestroyed,
    AuthenticationSucceeded,
    AuthenticationFailed,
    TicketRejected,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::SessionCreated,
        EventKind::SessionDestroyed,
        EventKind::AuthenticationSucceeded,
        EventKind::AuthenticationFailed,
        EventKind::TicketRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionCreated => "session_created",
            EventKind::SessionDestroyed => "session_destroyed",
            EventKind::AuthenticationSucceeded => "authentication_succeeded",
            EventKind::AuthenticationFailed => "authentication_failed",
            EventKind::TicketRejected => "ticket_rejected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl SsoEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SsoEvent::SessionCreated { .. } => EventKind::SessionCreated,
            SsoEvent::SessionDestroyed { .. } => EventKind::SessionDestroyed,
            SsoEvent::AuthenticationSucceeded { .. } => EventKind::AuthenticationSucceeded,
            SsoEvent::AuthenticationFailed { .. } => EventKind::AuthenticationFailed,
            SsoEvent::TicketRejected { .. } => EventKind::TicketRejected,
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            SsoEvent::SessionCreated { meta }
            | SsoEvent::SessionDestroyed { meta, .. }
            | SsoEvent::AuthenticationSucceeded { meta }
            | SsoEvent::AuthenticationFailed { meta, .. }
            | SsoEvent::TicketRejected { meta, .. } => meta,
        }
    }

    pub fn principal(&self) -> &str { &self.meta().principal }
    pub fn session_id(&self) -> Option<&SessionId> { self.meta().session_id.as_ref() }
}
