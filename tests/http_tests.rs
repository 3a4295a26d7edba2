//! HTTP surface: authority endpoints and partner-side invalidation push, over real sockets.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use ssoward::agent::PartnerAgent;
use ssoward::config::{ChainConfig, PartnerAppConfig, SsoConfig, StoreConfig};
use ssoward::gateway::SsoGateway;
use ssoward::identity::UserRecord;
use ssoward::server::{self, TicketResponse};
use ssoward::session::{HttpInvalidationNotifier, SessionId};

fn config(partner_apps: Vec<PartnerAppConfig>) -> SsoConfig {
    SsoConfig {
        chain: ChainConfig {
            store_timeout_ms: 1_000,
            stores: vec![StoreConfig::Memory {
                name: "local".into(),
                users: vec![UserRecord { name: "alice".into(), password: Some("pw".into()), ..Default::default() }],
            }],
        },
        partner_apps,
        ..SsoConfig::default()
    }
}

struct Running {
    base: String,
    stop: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn stop(mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        self.task.await.unwrap().unwrap();
    }
}

async fn start(gateway: Arc<SsoGateway>) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server::serve(listener, gateway, async move {
        let _ = rx.await;
    }));
    Running { base, stop: Some(tx), task }
}

fn session_cookie(resp: &reqwest::Response) -> String {
    let raw = resp.headers().get("set-cookie").unwrap().to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn login_ticket_touch_logout_over_http() {
    let gw = Arc::new(SsoGateway::from_config(&config(vec![])).unwrap());
    let srv = start(gw.clone()).await;
    let client = reqwest::Client::new();

    let health = client.get(&srv.base).send().await.unwrap();
    assert_eq!(health.text().await.unwrap(), "ssoward ok");

    let bad = client
        .post(format!("{}/login", srv.base))
        .json(&json!({"username": "alice", "password": "wrong"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status().as_u16(), 401);
    let body: Value = bad.json().await.unwrap();
    assert_eq!(body["code"], "authentication_failure");

    let resp = client
        .post(format!("{}/login", srv.base))
        .header("x-forwarded-for", "10.9.8.7")
        .json(&json!({"username": "alice", "password": "pw"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let cookie = session_cookie(&resp);
    let body: Value = resp.json().await.unwrap();
    let sid = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(cookie, format!("ssoward_session={}", sid));
    assert_eq!(body["principal"]["attrs"]["ip"], "10.9.8.7");

    let ticket: TicketResponse = client
        .post(format!("{}/tickets", srv.base))
        .header("cookie", &cookie)
        .json(&json!({"partner_app": "wiki"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ticket.expires_in_ms, 30_000);

    let redeem = || {
        client
            .post(format!("{}/tickets/validate", srv.base))
            .json(&json!({"ticket": ticket.ticket, "partner_app": "wiki"}))
            .send()
    };
    let first: Value = redeem().await.unwrap().json().await.unwrap();
    assert_eq!(first["session_id"], sid.as_str());
    let second = redeem().await.unwrap();
    assert_eq!(second.status().as_u16(), 403);
    assert_eq!(second.json::<Value>().await.unwrap()["code"], "invalid_ticket");

    let touched = client.post(format!("{}/sessions/touch", srv.base)).header("cookie", &cookie).send().await.unwrap();
    assert_eq!(touched.status().as_u16(), 200);

    let out = client
        .post(format!("{}/logout", srv.base))
        .json(&json!({"session_id": sid}))
        .send()
        .await
        .unwrap();
    assert_eq!(out.status().as_u16(), 200);
    assert!(out.headers().get("set-cookie").unwrap().to_str().unwrap().starts_with("ssoward_session=deleted"));

    let gone = client.post(format!("{}/sessions/touch", srv.base)).header("cookie", &cookie).send().await.unwrap();
    assert_eq!(gone.status().as_u16(), 404);
    assert_eq!(gone.json::<Value>().await.unwrap()["code"], "session_not_found");

    srv.stop().await;
    assert!(gw.registry().is_closed());
}

#[tokio::test]
async fn logout_pushes_invalidation_to_partner_agent() {
    // Partner side first, so its URL can go into the authority's config.
    let agent_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let agent_url = format!("http://{}/sso/invalidate", agent_listener.local_addr().unwrap());
    let cfg = config(vec![PartnerAppConfig { id: "wiki".into(), invalidation_url: Some(agent_url) }]);
    let notifier = HttpInvalidationNotifier::new(&cfg.partner_apps, Duration::from_secs(2)).unwrap();
    let gw = Arc::new(SsoGateway::from_config_with_notifier(&cfg, Arc::new(notifier)).unwrap());

    let agent = Arc::new(PartnerAgent::new("wiki", gw.registry().clone(), Duration::from_secs(300)));
    let agent_app = server::agent_router(agent.clone());
    let agent_task = tokio::spawn(async move { axum::serve(agent_listener, agent_app).await });

    let login = gw
        .login(&ssoward::gateway::LoginRequest { username: "alice".into(), password: "pw".into(), remote_host: None })
        .await
        .unwrap();
    let sid: SessionId = login.session.id;
    let t = gw.issue_ticket(&sid, "wiki").unwrap();
    agent.adopt_ticket("jsession-1", &t.id).unwrap();
    assert_eq!(agent.local_sessions(), 1);

    gw.logout(&sid).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while agent.local_sessions() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("invalidation was not delivered to the partner agent");
    assert!(agent.authenticate_request("jsession-1").is_err());

    agent_task.abort();
}
