//! Unified login entry point: authenticates against the credential chain, builds the
//! principal, opens a global session and reports the outcome on the event bus.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SsoConfig;
use crate::error::{SsoError, SsoResult};
use crate::event::{AuditListener, EventBus, EventMeta, JsonLinesAuditSink, LoginFailureMonitor, SsoEvent};
use crate::identity::{Attrs, BasicAuthScheme, Credential, CredentialChain, NtlmAuthScheme, Principal, UserKey};
use crate::session::{
    DestroyReason, GlobalSession, HttpInvalidationNotifier, InvalidationNotifier, SessionId, SessionRegistry, Ticket,
};
use crate::tprintln;

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remote_host: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub session: GlobalSession,
}

pub struct SsoGateway {
    chain: CredentialChain,
    registry: Arc<SessionRegistry>,
    bus: Arc<EventBus>,
}

impl SsoGateway {
    pub fn new(chain: CredentialChain, registry: Arc<SessionRegistry>, bus: Arc<EventBus>) -> Self {
        Self { chain, registry, bus }
    }

    /// Build the whole authority from configuration: stores, bus listeners, registry and
    /// HTTP invalidation push.
    pub fn from_config(cfg: &SsoConfig) -> anyhow::Result<Self> {
        let notifier = HttpInvalidationNotifier::new(&cfg.partner_apps, cfg.notify_timeout())?;
        Self::from_config_with_notifier(cfg, Arc::new(notifier))
    }

    pub fn from_config_with_notifier(cfg: &SsoConfig, notifier: Arc<dyn InvalidationNotifier>) -> anyhow::Result<Self> {
        cfg.validate()?;
        let bus = Arc::new(EventBus::new());
        if let Some(audit) = &cfg.audit {
            AuditListener::new(JsonLinesAuditSink::new(&audit.path)).register(&bus);
        }
        LoginFailureMonitor::with_limits(
            cfg.login_failure_threshold,
            cfg.login_failure_window(),
            cfg.login_failure_capacity,
        )
        .register(&bus);
        let chain = cfg.chain.build()?;
        let registry = Arc::new(SessionRegistry::new(cfg.registry.clone(), bus.clone(), notifier));
        Ok(Self::new(chain, registry, bus))
    }

    pub fn chain(&self) -> &CredentialChain { &self.chain }
    pub fn registry(&self) -> &Arc<SessionRegistry> { &self.registry }
    pub fn bus(&self) -> &Arc<EventBus> { &self.bus }

    pub async fn login(&self, req: &LoginRequest) -> SsoResult<LoginResponse> {
        let outcome = match self.authenticate(req).await {
            Ok(principal) => self.registry.create_session(principal, req.remote_host.clone()),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(session) => {
                tprintln!("gateway.login user={} sid={}", session.principal.user_id, session.id);
                self.bus.publish(&SsoEvent::AuthenticationSucceeded {
                    meta: EventMeta::new(session.principal.user_id.clone(), Some(session.id.clone()), req.remote_host.clone()),
                });
                Ok(LoginResponse { session })
            }
            Err(e) => {
                if matches!(e, SsoError::AggregateResolutionFailure { .. }) {
                    info!(target: "ssoward::chain", user = %req.username, "{}", e);
                }
                self.bus.publish(&SsoEvent::AuthenticationFailed {
                    meta: EventMeta::new(req.username.clone(), None, req.remote_host.clone()),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn authenticate(&self, req: &LoginRequest) -> SsoResult<Principal> {
        self.chain.bind(&req.username, &req.password).await?;
        let uid = self.chain.load_uid(&UserKey::new(req.username.as_str()), &BasicAuthScheme).await?;
        let key = UserKey::new(uid);
        let user = self.chain.resolve_identity(&key).await?;
        let roles = self.chain.resolve_roles(&key).await?;
        // Domain controller is informational; users without NTLM data still log in.
        let domain_controller = self
            .chain
            .load_credentials(&key, &NtlmAuthScheme)
            .await
            .ok()
            .and_then(|creds| {
                creds.into_iter().find_map(|c| match c {
                    Credential::DomainController(dc) => dc,
                    _ => None,
                })
            });
        Ok(Principal {
            user_id: user.name,
            roles: roles.into_iter().map(|r| r.name).collect(),
            attrs: Attrs { ip: req.remote_host.clone(), domain_controller, properties: user.properties },
        })
    }

    pub fn logout(&self, session_id: &SessionId) -> SsoResult<()> {
        self.registry.destroy_session(session_id, DestroyReason::Logout)
    }

    pub fn issue_ticket(&self, session_id: &SessionId, partner_app: &str) -> SsoResult<Ticket> {
        self.registry.issue_ticket(session_id, partner_app)
    }

    pub fn validate_ticket(&self, ticket: &str, partner_app: &str) -> SsoResult<GlobalSession> {
        self.registry.validate_ticket(ticket, partner_app)
    }

    pub fn touch(&self, session_id: &SessionId) -> SsoResult<()> {
        self.registry.touch(session_id)
    }
}
