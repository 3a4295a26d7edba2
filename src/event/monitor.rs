use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::warn;

use crate::session::elapsed_since;

use super::bus::{EventBus, SsoEventListener};
use super::types::{EventKind, SsoEvent};

#[derive(Debug, Clone, Copy)]
struct FailureCount {
    count: u32,
    last_failure: DateTime<Utc>,
}

/// Counts consecutive failed logins per principal and warns once the threshold is reached.
///
/// Principals come straight from login requests, so the table is bounded: counts older than
/// `window` are forgotten, and at `capacity` the least recently failing principal is evicted.
pub struct LoginFailureMonitor {
    threshold: u32,
    window: Duration,
    capacity: usize,
    failures: Mutex<HashMap<String, FailureCount>>,
}

impl LoginFailureMonitor {
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(threshold: u32) -> Self {
        Self::with_limits(threshold, Self::DEFAULT_WINDOW, Self::DEFAULT_CAPACITY)
    }

    pub fn with_limits(threshold: u32, window: Duration, capacity: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            capacity: capacity.max(1),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(self, bus: &EventBus) -> Arc<Self> {
        let me = Arc::new(self);
        bus.subscribe(EventKind::AuthenticationFailed, me.clone());
        bus.subscribe(EventKind::AuthenticationSucceeded, me.clone());
        me
    }

    pub fn failures(&self, principal: &str) -> u32 {
        let now = Utc::now();
        self.failures
            .lock()
            .get(principal)
            .filter(|f| elapsed_since(now, f.last_failure) < self.window)
            .map(|f| f.count)
            .unwrap_or(0)
    }

    /// Number of principals currently tracked.
    pub fn tracked(&self) -> usize { self.failures.lock().len() }

    fn record_failure(&self, principal: &str, now: DateTime<Utc>) -> u32 {
        let mut map = self.failures.lock();
        if !map.contains_key(principal) && map.len() >= self.capacity {
            map.retain(|_, f| elapsed_since(now, f.last_failure) < self.window);
            if map.len() >= self.capacity {
                let oldest = map.iter().min_by_key(|(_, f)| f.last_failure).map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    map.remove(&k);
                }
            }
        }
        let entry = map.entry(principal.to_string()).or_insert(FailureCount { count: 0, last_failure: now });
        if elapsed_since(now, entry.last_failure) >= self.window {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_failure = now;
        entry.count
    }
}

impl SsoEventListener for LoginFailureMonitor {
    fn name(&self) -> &str { "login-failure-monitor" }

    fn handle_event(&self, event: &SsoEvent) -> anyhow::Result<()> {
        match event {
            SsoEvent::AuthenticationFailed { meta, reason } => {
                let n = self.record_failure(&meta.principal, meta.timestamp);
                if n >= self.threshold {
                    warn!(
                        target: "ssoward::events",
                        principal = %meta.principal,
                        remote_host = ?meta.remote_host,
                        failures = n,
                        "repeated authentication failures (last: {})", reason
                    );
                }
            }
            SsoEvent::AuthenticationSucceeded { meta } => {
                self.failures.lock().remove(&meta.principal);
            }
            _ => {}
        }
        Ok(())
    }
}
