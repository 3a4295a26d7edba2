//!
//! ssoward HTTP server
//! -------------------
//! Axum front for the SSO authority and for partner-app agents.
//!
//! Responsibilities:
//! - Login/logout backed by the gateway, with the global session id carried in a cookie.
//! - Ticket issuance and redemption for partner apps.
//! - Idle keep-alive for global sessions.
//! - Partner-side endpoint receiving remote invalidations.
//! - Background reaper for expired sessions and tickets.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::agent::PartnerAgent;
use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};
use crate::gateway::{LoginRequest, SsoGateway};
use crate::session::{InvalidationPayload, SessionId};

pub const SESSION_COOKIE: &str = "ssoward_session";

impl IntoResponse for SsoError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(target: "ssoward::server", code = self.code_str(), "{}", self);
        }
        (status, Json(self.body())).into_response()
    }
}

#[derive(Clone)]
struct AppState {
    gateway: Arc<SsoGateway>,
}

/// Body of the session-scoped endpoints. The cookie is used when `session_id` is absent.
#[derive(Debug, Default, Deserialize)]
struct SessionRef {
    #[serde(default)]
    session_id: Option<SessionId>,
}

#[derive(Debug, Deserialize)]
struct TicketPayload {
    #[serde(default)]
    session_id: Option<SessionId>,
    partner_app: String,
}

#[derive(Debug, Deserialize)]
struct ValidatePayload {
    ticket: String,
    partner_app: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub partner_app: String,
    pub expires_in_ms: u64,
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie")?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some((k, v)) = p.split_once('=') {
            if k == name { return Some(v.to_string()); }
        }
    }
    None
}

fn set_session_cookie(sid: &SessionId) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, sid)).ok()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_static("ssoward_session=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/")
}

/// Session id from the request body, falling back to the session cookie.
fn resolve_session(headers: &HeaderMap, explicit: Option<SessionId>) -> SsoResult<SessionId> {
    explicit
        .or_else(|| parse_cookie(headers, SESSION_COOKIE).map(SessionId::from))
        .ok_or(SsoError::SessionNotFound)
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let v = headers.get("x-forwarded-for")?.to_str().ok()?;
    v.split(',').next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Empty bodies are allowed so cookie-only clients need not send `{}`.
fn parse_optional<T: Default + serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        (StatusCode::BAD_REQUEST, Json(json!({"status":"error","code":"bad_request","message": e.to_string()}))).into_response()
    })
}

async fn login(State(state): State<AppState>, headers: HeaderMap, Json(mut payload): Json<LoginRequest>) -> Response {
    if payload.remote_host.is_none() {
        payload.remote_host = forwarded_for(&headers);
    }
    match state.gateway.login(&payload).await {
        Ok(resp) => {
            let mut h = HeaderMap::new();
            if let Some(cookie) = set_session_cookie(&resp.session.id) {
                h.insert("Set-Cookie", cookie);
            }
            let body = json!({
                "status": "ok",
                "session_id": resp.session.id,
                "principal": resp.session.principal,
            });
            (StatusCode::OK, h, Json(body)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: SessionRef = match parse_optional(&body) {
        Ok(p) => p,
        Err(r) => return r,
    };
    let result = resolve_session(&headers, payload.session_id).and_then(|sid| state.gateway.logout(&sid));
    match result {
        Ok(()) => {
            let mut h = HeaderMap::new();
            h.insert("Set-Cookie", clear_session_cookie());
            (StatusCode::OK, h, Json(json!({"status":"ok"}))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn touch(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let payload: SessionRef = match parse_optional(&body) {
        Ok(p) => p,
        Err(r) => return r,
    };
    match resolve_session(&headers, payload.session_id).and_then(|sid| state.gateway.touch(&sid)) {
        Ok(()) => Json(json!({"status":"ok"})).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn issue_ticket(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<TicketPayload>) -> Response {
    let issued = resolve_session(&headers, payload.session_id)
        .and_then(|sid| state.gateway.issue_ticket(&sid, &payload.partner_app));
    match issued {
        Ok(t) => Json(TicketResponse {
            ticket: t.id,
            partner_app: t.partner_app,
            expires_in_ms: u64::try_from(t.ttl.as_millis()).unwrap_or(u64::MAX),
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn validate_ticket(State(state): State<AppState>, Json(payload): Json<ValidatePayload>) -> Response {
    match state.gateway.validate_ticket(&payload.ticket, &payload.partner_app) {
        Ok(session) => Json(json!({
            "status": "ok",
            "session_id": session.id,
            "principal": session.principal,
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Authority routes.
pub fn router(gateway: Arc<SsoGateway>) -> Router {
    Router::new()
        .route("/", get(|| async { "ssoward ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/tickets", post(issue_ticket))
        .route("/tickets/validate", post(validate_ticket))
        .route("/sessions/touch", post(touch))
        .with_state(AppState { gateway })
}

async fn invalidate(State(agent): State<Arc<PartnerAgent>>, Json(payload): Json<InvalidationPayload>) -> Response {
    let dropped = agent.on_remote_invalidated(&payload.session_id);
    Json(json!({"status":"ok","dropped": dropped})).into_response()
}

/// Partner-app routes: receives invalidations pushed by the authority.
pub fn agent_router(agent: Arc<PartnerAgent>) -> Router {
    Router::new().route("/sso/invalidate", post(invalidate)).with_state(agent)
}

/// Serve the authority on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: tokio::net::TcpListener, gateway: Arc<SsoGateway>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let reaper = gateway.registry().spawn_reaper();
    let app = router(gateway.clone());
    let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;
    let destroyed = gateway.registry().shutdown(true);
    info!(target: "ssoward::server", destroyed, "sessions expired at shutdown");
    reaper.abort();
    served?;
    Ok(())
}

pub async fn run(config: SsoConfig) -> anyhow::Result<()> {
    let gateway = Arc::new(SsoGateway::from_config(&config)?);
    info!(
        target: "ssoward::server",
        stores = ?gateway.chain().store_names(),
        partner_apps = config.partner_apps.len(),
        "authority configured"
    );
    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(target: "ssoward::server", "Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, gateway, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
}
