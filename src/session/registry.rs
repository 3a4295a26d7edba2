//! Authoritative global session table.
//!
//! Locking: the outer map lock is only held to look up, insert or remove a slot; every
//! mutation of a session happens under that session's own mutex, so work on different
//! sessions never contends. A session is marked terminal under its mutex before it leaves
//! the map, which makes liveness reads linearizable with the most recent destroy.
//! Ticket table lock is taken inside a slot lock (issue) or on its own (validate); never
//! the other way round.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RegistryConfig;
use crate::error::{SsoError, SsoResult};
use crate::event::{EventBus, EventMeta, SsoEvent};
use crate::identity::Principal;
use crate::tprintln;

use super::notifier::InvalidationNotifier;
use super::types::{DestroyReason, GlobalSession, SessionId, SessionState, Ticket};

/// Operations a partner app's shadow may request of the authority. The authority stays
/// the sole mutator of session state.
pub trait SsoAuthority: Send + Sync {
    fn validate_ticket(&self, ticket: &str, partner_app: &str) -> SsoResult<GlobalSession>;
    fn destroy_session(&self, id: &SessionId, reason: DestroyReason) -> SsoResult<()>;
    fn touch(&self, id: &SessionId) -> SsoResult<()>;
    fn is_session_active(&self, id: &SessionId) -> bool;
    fn unbind_partner_app(&self, id: &SessionId, partner_app: &str) -> SsoResult<()>;
}

type Slot = Arc<Mutex<GlobalSession>>;

/// What is left to do for a session after it was marked terminal under its lock.
struct Retired {
    id: SessionId,
    principal: String,
    remote_host: Option<String>,
    bound_apps: BTreeSet<String>,
    reason: DestroyReason,
}

fn gen_token(buf: &mut [u8]) -> SsoResult<String> {
    getrandom::getrandom(buf).map_err(|e| SsoError::internal(format!("random source: {}", e)))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&*buf))
}

pub struct SessionRegistry {
    config: RegistryConfig,
    bus: Arc<EventBus>,
    notifier: Arc<dyn InvalidationNotifier>,
    sessions: RwLock<HashMap<SessionId, Slot>>,
    tickets: Mutex<HashMap<String, Ticket>>,
    seq: AtomicU64,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, bus: Arc<EventBus>, notifier: Arc<dyn InvalidationNotifier>) -> Self {
        Self {
            config,
            bus,
            notifier,
            sessions: RwLock::new(HashMap::new()),
            tickets: Mutex::new(HashMap::new()),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RegistryConfig { &self.config }
    pub fn bus(&self) -> &Arc<EventBus> { &self.bus }
    pub fn active_sessions(&self) -> usize { self.sessions.read().len() }
    pub fn outstanding_tickets(&self) -> usize { self.tickets.lock().len() }
    pub fn is_closed(&self) -> bool { self.closed.load(Ordering::SeqCst) }

    fn ensure_open(&self) -> SsoResult<()> {
        if self.is_closed() { Err(SsoError::RegistryClosed) } else { Ok(()) }
    }

    /// 8-byte sequence prefix guarantees uniqueness; the 24 random bytes make it unguessable.
    fn next_session_id(&self) -> SsoResult<SessionId> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf[8..]).map_err(|e| SsoError::internal(format!("random source: {}", e)))?;
        buf[..8].copy_from_slice(&seq.to_be_bytes());
        Ok(SessionId(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)))
    }

    fn slot(&self, id: &SessionId) -> SsoResult<Slot> {
        self.sessions.read().get(id).cloned().ok_or(SsoError::SessionNotFound)
    }

    /// Run `f` against a live session. A session found past its timeout is destroyed with
    /// `Expired` and reported as `SessionExpired`.
    fn with_live_session<T>(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut GlobalSession) -> SsoResult<T>,
    ) -> SsoResult<T> {
        let slot = self.slot(id)?;
        let retired = {
            let mut s = slot.lock();
            if s.state.is_terminal() {
                return Err(SsoError::SessionNotFound);
            }
            if !s.is_due(now) {
                return f(&mut *s);
            }
            Self::retire(&mut s, DestroyReason::Expired)
        };
        self.finish_retire(retired);
        Err(SsoError::SessionExpired)
    }

    fn retire(s: &mut GlobalSession, reason: DestroyReason) -> Retired {
        s.state = reason.terminal_state();
        Retired {
            id: s.id.clone(),
            principal: s.principal.user_id.clone(),
            remote_host: s.remote_host.clone(),
            bound_apps: std::mem::take(&mut s.bound_apps),
            reason,
        }
    }

    fn finish_retire(&self, r: Retired) {
        self.sessions.write().remove(&r.id);
        self.tickets.lock().retain(|_, t| t.session_id != r.id);
        info!(
            target: "ssoward::registry",
            session_id = %r.id,
            principal = %r.principal,
            reason = r.reason.as_str(),
            bound_apps = r.bound_apps.len(),
            "session destroyed"
        );
        self.bus.publish(&SsoEvent::SessionDestroyed {
            meta: EventMeta::new(r.principal.clone(), Some(r.id.clone()), r.remote_host.clone()),
            reason: r.reason,
        });
        for app in &r.bound_apps {
            if let Err(e) = self.notifier.notify(app, &r.id) {
                warn!(target: "ssoward::registry", partner_app = %app, session_id = %r.id, "invalidation not delivered: {}", e);
            }
        }
    }

    pub fn create_session(&self, principal: Principal, remote_host: Option<String>) -> SsoResult<GlobalSession> {
        self.ensure_open()?;
        let id = self.next_session_id()?;
        let now = Utc::now();
        let session = GlobalSession {
            id: id.clone(),
            principal,
            remote_host,
            created_at: now,
            last_access: now,
            idle_timeout: self.config.idle_timeout(),
            absolute_timeout: self.config.absolute_timeout(),
            bound_apps: BTreeSet::new(),
            state: SessionState::Active,
        };
        self.sessions.write().insert(id.clone(), Arc::new(Mutex::new(session.clone())));
        tprintln!("registry.create user={} sid={}", session.principal.user_id, id);
        info!(target: "ssoward::registry", session_id = %id, principal = %session.principal.user_id, "session created");
        self.bus.publish(&SsoEvent::SessionCreated {
            meta: EventMeta::new(session.principal.user_id.clone(), Some(id), session.remote_host.clone()),
        });
        Ok(session)
    }

    pub fn issue_ticket(&self, session_id: &SessionId, partner_app: &str) -> SsoResult<Ticket> {
        self.ensure_open()?;
        let now = Utc::now();
        let ttl = self.config.ticket_ttl();
        self.with_live_session(session_id, now, |_| {
            let mut tickets = self.tickets.lock();
            let mut buf = [0u8; 32];
            let id = loop {
                let candidate = gen_token(&mut buf)?;
                if !tickets.contains_key(&candidate) { break candidate; }
            };
            let ticket = Ticket {
                id: id.clone(),
                session_id: session_id.clone(),
                partner_app: partner_app.to_string(),
                issued_at: now,
                ttl,
            };
            tickets.insert(id, ticket.clone());
            debug!(target: "ssoward::registry", session_id = %session_id, partner_app, "ticket issued");
            Ok(ticket)
        })
    }

    /// Redeem a ticket for `partner_app`. The ticket is consumed before any check runs, so a
    /// second attempt always fails whatever happened to the first.
    pub fn validate_ticket(&self, ticket: &str, partner_app: &str) -> SsoResult<GlobalSession> {
        self.ensure_open()?;
        let now = Utc::now();
        let taken = self.tickets.lock().remove(ticket);
        let Some(t) = taken else {
            return Err(self.reject(EventMeta::new("", None, None), partner_app, "unknown or already consumed"));
        };
        // Resolved before any check; a failed check may destroy the session.
        let meta = self.ticket_meta(&t);
        if t.is_expired(now) {
            return Err(self.reject(meta, partner_app, "expired"));
        }
        if t.partner_app != partner_app {
            return Err(self.reject(meta, partner_app, "issued for another partner app"));
        }
        let bound = self.with_live_session(&t.session_id, now, |s| {
            s.bound_apps.insert(partner_app.to_string());
            s.last_access = now;
            Ok(s.clone())
        });
        match bound {
            Ok(session) => {
                debug!(target: "ssoward::registry", session_id = %session.id, partner_app, "ticket redeemed");
                Ok(session)
            }
            Err(e) => Err(self.reject(meta, partner_app, &format!("session not active: {}", e))),
        }
    }

    /// Event metadata naming the ticket's session and, while it is still registered, its owner.
    fn ticket_meta(&self, t: &Ticket) -> EventMeta {
        match self.slot(&t.session_id) {
            Ok(slot) => {
                let s = slot.lock();
                EventMeta::new(s.principal.user_id.clone(), Some(t.session_id.clone()), s.remote_host.clone())
            }
            Err(_) => EventMeta::new("", Some(t.session_id.clone()), None),
        }
    }

    fn reject(&self, meta: EventMeta, partner_app: &str, reason: &str) -> SsoError {
        debug!(target: "ssoward::registry", principal = %meta.principal, partner_app, "ticket rejected: {}", reason);
        self.bus.publish(&SsoEvent::TicketRejected {
            meta,
            partner_app: partner_app.to_string(),
            reason: reason.to_string(),
        });
        SsoError::invalid_ticket(reason)
    }

    /// Refresh last-access time; drives the idle timeout.
    pub fn touch(&self, session_id: &SessionId) -> SsoResult<()> {
        self.ensure_open()?;
        let now = Utc::now();
        self.with_live_session(session_id, now, |s| {
            s.last_access = now;
            Ok(())
        })
    }

    /// Snapshot of a live session.
    pub fn session(&self, session_id: &SessionId) -> SsoResult<GlobalSession> {
        self.with_live_session(session_id, Utc::now(), |s| Ok(s.clone()))
    }

    pub fn is_session_active(&self, session_id: &SessionId) -> bool {
        self.session(session_id).is_ok()
    }

    pub fn unbind_partner_app(&self, session_id: &SessionId, partner_app: &str) -> SsoResult<()> {
        self.with_live_session(session_id, Utc::now(), |s| {
            s.bound_apps.remove(partner_app);
            Ok(())
        })
    }

    /// Terminal transition. Publishes `SessionDestroyed`, then pushes an invalidation to every
    /// partner app bound at the moment of destruction.
    pub fn destroy_session(&self, session_id: &SessionId, reason: DestroyReason) -> SsoResult<()> {
        let slot = self.slot(session_id)?;
        let retired = {
            let mut s = slot.lock();
            if s.state.is_terminal() {
                return Err(SsoError::SessionNotFound);
            }
            Self::retire(&mut s, reason)
        };
        self.finish_retire(retired);
        Ok(())
    }

    pub fn reap_expired(&self) -> usize { self.reap_expired_at(Utc::now()) }

    /// Destroy every session past idle or absolute timeout at `now` and drop expired tickets.
    pub fn reap_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.tickets.lock().retain(|_, t| !t.is_expired(now));
        let slots: Vec<Slot> = self.sessions.read().values().cloned().collect();
        let mut reaped = 0usize;
        for slot in slots {
            let retired = {
                let mut s = slot.lock();
                if s.state.is_terminal() || !s.is_due(now) { continue; }
                Self::retire(&mut s, DestroyReason::Expired)
            };
            self.finish_retire(retired);
            reaped += 1;
        }
        if reaped > 0 {
            debug!(target: "ssoward::registry", reaped, "reaper pass");
        }
        reaped
    }

    /// Periodic reaper on the current tokio runtime. Stops once the registry is closed or
    /// dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let interval = self.config.reaper_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(registry) = weak.upgrade() else { break; };
                if registry.is_closed() { break; }
                registry.reap_expired();
            }
        })
    }

    /// Reject new operations from now on. With `force_expire`, every live session is destroyed
    /// with `Shutdown`. Returns the number of sessions destroyed.
    pub fn shutdown(&self, force_expire: bool) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        info!(target: "ssoward::registry", force_expire, "registry closed");
        if !force_expire { return 0; }
        let ids: Vec<SessionId> = self.sessions.read().keys().cloned().collect();
        ids.iter().filter(|id| self.destroy_session(id, DestroyReason::Shutdown).is_ok()).count()
    }
}

impl SsoAuthority for SessionRegistry {
    fn validate_ticket(&self, ticket: &str, partner_app: &str) -> SsoResult<GlobalSession> {
        SessionRegistry::validate_ticket(self, ticket, partner_app)
    }

    fn destroy_session(&self, id: &SessionId, reason: DestroyReason) -> SsoResult<()> {
        SessionRegistry::destroy_session(self, id, reason)
    }

    fn touch(&self, id: &SessionId) -> SsoResult<()> {
        SessionRegistry::touch(self, id)
    }

    fn is_session_active(&self, id: &SessionId) -> bool {
        SessionRegistry::is_session_active(self, id)
    }

    fn unbind_partner_app(&self, id: &SessionId, partner_app: &str) -> SsoResult<()> {
        SessionRegistry::unbind_partner_app(self, id, partner_app)
    }
}
