use super::*;

const SAMPLE: &str = r#"{
    "http_port": 9000,
    "registry": { "idle_timeout_ms": 60000, "ticket_ttl_ms": 5000 },
    "chain": {
        "store_timeout_ms": 500,
        "stores": [
            { "kind": "memory", "name": "local", "users": [
                { "name": "alice", "password": "s3cret", "roles": ["admin"] }
            ] },
            { "kind": "json_file", "name": "directory", "path": "/etc/ssoward/users.json" }
        ]
    },
    "partner_apps": [
        { "id": "payroll", "invalidation_url": "http://payroll.local/sso/invalidate" },
        { "id": "wiki" }
    ]
}"#;

#[test]
fn parses_sections_and_fills_defaults() {
    let cfg: SsoConfig = serde_json::from_str(SAMPLE).unwrap();
    assert_eq!(cfg.http_port, 9000);
    assert_eq!(cfg.registry.idle_timeout(), Duration::from_secs(60));
    assert_eq!(cfg.registry.ticket_ttl(), Duration::from_secs(5));
    // Unspecified fields keep their defaults.
    assert_eq!(cfg.registry.absolute_timeout_ms, RegistryConfig::default().absolute_timeout_ms);
    assert_eq!(cfg.login_failure_threshold, 5);
    assert_eq!(cfg.login_failure_window(), Duration::from_secs(15 * 60));
    assert_eq!(cfg.login_failure_capacity, 10_000);
    assert!(cfg.audit.is_none());

    assert_eq!(cfg.chain.store_timeout(), Duration::from_millis(500));
    let names: Vec<&str> = cfg.chain.stores.iter().map(|s| s.name()).collect();
    assert_eq!(names, ["local", "directory"]);
    assert!(matches!(&cfg.chain.stores[1], StoreConfig::JsonFile { path, .. } if path.ends_with("users.json")));
    assert_eq!(cfg.partner_apps[1].invalidation_url, None);
    cfg.validate().unwrap();
}

#[test]
fn validate_rejects_empty_chain_and_duplicate_apps() {
    let empty = SsoConfig::default();
    assert!(matches!(empty.validate(), Err(SsoError::Config(_))));

    let mut dup: SsoConfig = serde_json::from_str(SAMPLE).unwrap();
    dup.partner_apps.push(PartnerAppConfig { id: "wiki".into(), invalidation_url: None });
    let err = dup.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate partner app id 'wiki'"), "{}", err);
}

#[test]
fn builds_chain_in_declared_order() {
    let dir = tempfile::tempdir().unwrap();
    let users = dir.path().join("users.json");
    std::fs::write(&users, r#"{"users":[{"name":"bob","password":"pw"}]}"#).unwrap();
    let chain = ChainConfig {
        store_timeout_ms: 250,
        stores: vec![
            StoreConfig::Memory { name: "first".into(), users: vec![] },
            StoreConfig::JsonFile { name: "second".into(), path: users },
        ],
    }
    .build()
    .unwrap();
    assert_eq!(chain.store_names(), ["first", "second"]);
}

#[test]
fn missing_users_file_names_the_store() {
    let chain = ChainConfig {
        store_timeout_ms: 250,
        stores: vec![StoreConfig::JsonFile { name: "ldap-export".into(), path: "/nonexistent/users.json".into() }],
    };
    let err = chain.build().unwrap_err();
    assert!(format!("{:#}", err).contains("ldap-export"));
}

// Only this test touches the process environment.
#[test]
fn load_reads_file_then_applies_env_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ssoward.json");
    std::fs::write(&path, SAMPLE).unwrap();

    std::env::set_var("SSOWARD_HTTP_PORT", "7001");
    std::env::set_var("SSOWARD_TICKET_TTL_MS", "1500");
    let loaded = SsoConfig::load(Some(&path));
    std::env::set_var("SSOWARD_HTTP_PORT", "not-a-port");
    let bad = SsoConfig::load(Some(&path));
    std::env::remove_var("SSOWARD_HTTP_PORT");
    std::env::remove_var("SSOWARD_TICKET_TTL_MS");

    let cfg = loaded.unwrap();
    assert_eq!(cfg.http_port, 7001);
    assert_eq!(cfg.registry.ticket_ttl_ms, 1500);
    assert_eq!(cfg.registry.idle_timeout_ms, 60_000);
    assert!(bad.is_err());
}
