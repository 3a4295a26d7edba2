use super::*;
use crate::config::RegistryConfig;
use crate::error::{SsoError, SsoResult};
use crate::event::{EventBus, EventKind};
use crate::identity::Principal;
use crate::session::{DestroyReason, GlobalSession, SessionId, SessionRegistry, SsoAuthority};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const IDLE: Duration = Duration::from_secs(600);

struct Fixture {
    registry: Arc<SessionRegistry>,
    directory: Arc<LocalAgentDirectory>,
    bus: Arc<EventBus>,
}

fn fixture() -> Fixture {
    let bus = Arc::new(EventBus::new());
    let directory = Arc::new(LocalAgentDirectory::new());
    let registry = Arc::new(SessionRegistry::new(RegistryConfig::default(), bus.clone(), directory.clone()));
    Fixture { registry, directory, bus }
}

impl Fixture {
    fn agent(&self, app: &str) -> Arc<PartnerAgent> {
        let a = Arc::new(PartnerAgent::new(app, self.registry.clone(), IDLE));
        self.directory.register(&a);
        a
    }

    fn login(&self, user: &str) -> GlobalSession {
        self.registry.create_session(Principal::new(user), None).unwrap()
    }

    fn bind(&self, agent: &PartnerAgent, local_id: &str, sid: &SessionId) -> GlobalSession {
        let t = self.registry.issue_ticket(sid, agent.partner_app()).unwrap();
        agent.adopt_ticket(local_id, &t.id).unwrap()
    }
}

/// Delegates to a registry and counts every call made through the seam.
struct CountingAuthority {
    inner: Arc<SessionRegistry>,
    destroys: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingAuthority {
    fn new(inner: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self { inner, destroys: AtomicUsize::new(0), calls: AtomicUsize::new(0) })
    }
}

impl SsoAuthority for CountingAuthority {
    fn validate_ticket(&self, ticket: &str, partner_app: &str) -> SsoResult<GlobalSession> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.validate_ticket(ticket, partner_app)
    }
    fn destroy_session(&self, id: &SessionId, reason: DestroyReason) -> SsoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.destroys.fetch_add(1, Ordering::SeqCst);
        self.inner.destroy_session(id, reason)
    }
    fn touch(&self, id: &SessionId) -> SsoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.touch(id)
    }
    fn is_session_active(&self, id: &SessionId) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.is_session_active(id)
    }
    fn unbind_partner_app(&self, id: &SessionId, partner_app: &str) -> SsoResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.unbind_partner_app(id, partner_app)
    }
}

#[test]
fn local_logout_in_one_app_ends_the_other() {
    let fx = fixture();
    let payroll = fx.agent("payroll");
    let wiki = fx.agent("wiki");
    let destroyed = Arc::new(Mutex::new(Vec::new()));
    let d = destroyed.clone();
    fx.bus.subscribe_fn(EventKind::SessionDestroyed, "collector", move |ev| {
        d.lock().push(ev.clone());
        Ok(())
    });

    let s = fx.login("alice");
    fx.bind(&payroll, "p-1", &s.id);
    fx.bind(&wiki, "w-1", &s.id);
    assert_eq!(wiki.authenticate_request("w-1").unwrap(), s.id);

    assert!(payroll.session_destroyed("p-1").unwrap());

    assert!(!fx.registry.is_session_active(&s.id));
    assert!(matches!(wiki.authenticate_request("w-1"), Err(SsoError::SessionNotFound)));
    assert_eq!(wiki.local_sessions(), 0);
    assert_eq!(destroyed.lock().len(), 1);
    assert!(matches!(&destroyed.lock()[0], crate::event::SsoEvent::SessionDestroyed { reason: DestroyReason::LocalLogout, .. }));
}

#[test]
fn authority_logout_reaches_every_local_session() {
    let fx = fixture();
    let crm = fx.agent("crm");
    let s = fx.login("bob");
    fx.bind(&crm, "c-1", &s.id);
    fx.bind(&crm, "c-2", &s.id);

    fx.registry.destroy_session(&s.id, DestroyReason::Logout).unwrap();

    assert_eq!(crm.local_sessions(), 0);
    assert!(crm.authenticate_request("c-1").is_err());
    assert!(crm.authenticate_request("c-2").is_err());
}

#[test]
fn local_end_is_idempotent() {
    let fx = fixture();
    let counting = CountingAuthority::new(fx.registry.clone());
    let s = fx.login("carol");
    let t = fx.registry.issue_ticket(&s.id, "wiki").unwrap();
    let shadow = Arc::new(LocalSessionShadow::new("w-9", "wiki", counting.clone()));
    shadow.adopt_ticket(&t.id).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let sh = shadow.clone();
            scope.spawn(move || sh.on_local_session_ended().unwrap());
        }
    });
    assert!(!shadow.on_local_session_ended().unwrap());
    assert_eq!(counting.destroys.load(Ordering::SeqCst), 1);
    assert_eq!(shadow.state(), ShadowState::Destroyed);
}

#[test]
fn unbound_shadow_end_makes_no_remote_call() {
    let fx = fixture();
    let counting = CountingAuthority::new(fx.registry.clone());
    let shadow = LocalSessionShadow::new("x-1", "wiki", counting.clone());
    assert!(!shadow.on_local_session_ended().unwrap());
    assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn remote_invalidation_never_calls_back() {
    let fx = fixture();
    let counting = CountingAuthority::new(fx.registry.clone());
    let s = fx.login("dave");
    let t = fx.registry.issue_ticket(&s.id, "wiki").unwrap();
    let shadow = LocalSessionShadow::new("w-2", "wiki", counting.clone());
    shadow.adopt_ticket(&t.id).unwrap();
    let before = counting.calls.load(Ordering::SeqCst);

    assert!(shadow.on_remote_invalidated());
    assert!(!shadow.on_remote_invalidated());
    assert!(!shadow.on_local_session_ended().unwrap());
    assert_eq!(counting.calls.load(Ordering::SeqCst), before);
    assert!(fx.registry.is_session_active(&s.id));
}

#[test]
fn adopting_twice_is_rejected() {
    let fx = fixture();
    let wiki = fx.agent("wiki");
    let s = fx.login("erin");
    fx.bind(&wiki, "w-1", &s.id);
    let t = fx.registry.issue_ticket(&s.id, "wiki").unwrap();
    let err = wiki.adopt_ticket("w-1", &t.id).unwrap_err();
    assert_eq!(err, SsoError::InvalidShadowState { state: "bound" });
}

#[test]
fn failed_redemption_does_not_leave_a_shadow_behind() {
    let fx = fixture();
    let wiki = fx.agent("wiki");
    let s = fx.login("fay");
    for i in 0..50 {
        let t = fx.registry.issue_ticket(&s.id, "payroll").unwrap();
        let local = format!("w-{}", i);
        assert!(matches!(wiki.adopt_ticket(&local, &t.id), Err(SsoError::InvalidOrConsumedTicket { .. })));
        assert!(wiki.shadow(&local).is_none());
    }
    assert!(matches!(wiki.adopt_ticket("w-x", "forged"), Err(SsoError::InvalidOrConsumedTicket { .. })));
    assert_eq!(wiki.local_sessions(), 0);
}

#[test]
fn failed_redemption_keeps_container_session_unbound() {
    let fx = fixture();
    let wiki = fx.agent("wiki");
    let s = fx.login("fay");
    let shadow = wiki.session_created("w-1");
    let t = fx.registry.issue_ticket(&s.id, "payroll").unwrap();
    assert!(wiki.adopt_ticket("w-1", &t.id).is_err());
    let kept = wiki.shadow("w-1").unwrap();
    assert!(Arc::ptr_eq(&kept, &shadow));
    assert_eq!(kept.state(), ShadowState::Unbound);

    // A later ticket still binds the same container session.
    let t = fx.registry.issue_ticket(&s.id, "wiki").unwrap();
    assert_eq!(wiki.adopt_ticket("w-1", &t.id).unwrap().id, s.id);
    assert_eq!(kept.state(), ShadowState::Bound(s.id.clone()));
}

#[test]
fn local_idle_timeout_unbinds_but_keeps_global_session() {
    let fx = fixture();
    let wiki = fx.agent("wiki");
    let s = fx.login("gus");
    fx.bind(&wiki, "w-1", &s.id);
    let shadow = wiki.shadow("w-1").unwrap();

    let later = Utc::now() + chrono::Duration::minutes(11);
    assert_eq!(shadow.validate_local_at(IDLE, later), Err(SsoError::SessionExpired));
    assert_eq!(shadow.state(), ShadowState::Destroyed);

    let global = fx.registry.session(&s.id).unwrap();
    assert!(!global.is_bound_to("wiki"));
}

#[test]
fn sweep_idle_drops_stale_shadows() {
    let fx = fixture();
    let agent = Arc::new(PartnerAgent::new("crm", fx.registry.clone(), Duration::ZERO));
    fx.directory.register(&agent);
    let s = fx.login("hal");
    fx.bind(&agent, "c-1", &s.id);
    agent.session_created("c-unbound");

    assert_eq!(agent.sweep_idle(), 1);
    assert!(agent.shadow("c-1").is_none());
    assert!(agent.shadow("c-unbound").is_some());
    assert!(fx.registry.is_session_active(&s.id));
}

#[test]
fn keep_alive_on_dead_global_session_destroys_shadow() {
    let fx = fixture();
    let counting = CountingAuthority::new(fx.registry.clone());
    let agent = PartnerAgent::new("wiki", counting.clone(), IDLE);
    let s = fx.login("ida");
    let t = fx.registry.issue_ticket(&s.id, "wiki").unwrap();
    agent.adopt_ticket("w-1", &t.id).unwrap();
    agent.keep_alive("w-1").unwrap();

    // Not registered in the directory, so the push never arrives.
    fx.registry.destroy_session(&s.id, DestroyReason::Logout).unwrap();
    assert!(agent.authenticate_request("w-1").is_ok());
    assert_eq!(agent.keep_alive("w-1"), Err(SsoError::SessionNotFound));
    assert!(agent.shadow("w-1").is_none());
}

#[test]
fn dropped_agent_does_not_block_destroy() {
    let fx = fixture();
    let wiki = fx.agent("wiki");
    let s = fx.login("jay");
    fx.bind(&wiki, "w-1", &s.id);
    drop(wiki);

    fx.registry.destroy_session(&s.id, DestroyReason::Logout).unwrap();
    assert!(!fx.registry.is_session_active(&s.id));
    assert!(!fx.directory.unregister("payroll"));
}
