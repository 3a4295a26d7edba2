use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config_path = std::env::var("SSOWARD_CONFIG").ok().map(PathBuf::from);
    info!(
        target: "ssoward",
        "ssoward starting: RUST_LOG='{}', config='{}'",
        rust_log,
        config_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".to_string())
    );

    let config = ssoward::config::SsoConfig::load(config_path.as_deref())?;
    info!(
        target: "ssoward",
        http_port = config.http_port,
        idle_timeout_ms = config.registry.idle_timeout_ms,
        ticket_ttl_ms = config.registry.ticket_ttl_ms,
        "configuration loaded"
    );
    ssoward::server::run(config).await
}
