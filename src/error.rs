//! Unified error model for the SSO core and its HTTP surface.
//! Every failure that crosses a component boundary is one of these kinds; backend-local
//! failures (`StoreError`) and listener failures never escape their component.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SsoError {
    #[error("session not found")]
    SessionNotFound,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid or consumed ticket: {reason}")]
    InvalidOrConsumedTicket { reason: String },
    #[error("could not authenticate user in any store")]
    AuthenticationFailure,
    /// Per-backend failure. Recovered by failover inside the credential chain.
    #[error("store '{store}' unavailable: {reason}")]
    StoreUnavailable { store: String, reason: String },
    #[error("could not {operation} in any store")]
    AggregateResolutionFailure { operation: &'static str },
    /// Isolated inside the event bus; only ever logged.
    #[error("listener '{listener}' failed: {reason}")]
    ListenerFailure { listener: String, reason: String },
    #[error("local session shadow is {state}")]
    InvalidShadowState { state: &'static str },
    #[error("session registry is closed")]
    RegistryClosed,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SsoError {
    pub fn invalid_ticket(reason: impl Into<String>) -> Self {
        SsoError::InvalidOrConsumedTicket { reason: reason.into() }
    }

    pub fn config(msg: impl Into<String>) -> Self { SsoError::Config(msg.into()) }

    pub fn internal(msg: impl Into<String>) -> Self { SsoError::Internal(msg.into()) }

    /// Stable machine-readable code. Partner apps branch on this to decide between
    /// re-prompting for credentials and silently re-initiating SSO.
    pub fn code_str(&self) -> &'static str {
        match self {
            SsoError::SessionNotFound => "session_not_found",
            SsoError::SessionExpired => "session_expired",
            SsoError::InvalidOrConsumedTicket { .. } => "invalid_ticket",
            SsoError::AuthenticationFailure => "authentication_failure",
            SsoError::StoreUnavailable { .. } => "store_unavailable",
            SsoError::AggregateResolutionFailure { .. } => "aggregate_resolution_failure",
            SsoError::ListenerFailure { .. } => "listener_failure",
            SsoError::InvalidShadowState { .. } => "invalid_shadow_state",
            SsoError::RegistryClosed => "registry_closed",
            SsoError::Config(_) => "config_error",
            SsoError::Internal(_) => "internal_error",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            SsoError::SessionNotFound => 404,
            SsoError::SessionExpired => 401,
            SsoError::InvalidOrConsumedTicket { .. } => 403,
            SsoError::AuthenticationFailure => 401,
            SsoError::StoreUnavailable { .. } => 503,
            SsoError::AggregateResolutionFailure { .. } => 502,
            SsoError::InvalidShadowState { .. } => 409,
            SsoError::RegistryClosed => 503,
            SsoError::ListenerFailure { .. } | SsoError::Config(_) | SsoError::Internal(_) => 500,
        }
    }

    /// True when the caller should collect credentials again rather than re-run SSO.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, SsoError::AuthenticationFailure)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody { status: "error", code: self.code_str(), message: self.to_string() }
    }
}

/// JSON error payload returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub code: &'static str,
    pub message: String,
}

pub type SsoResult<T> = Result<T, SsoError>;
