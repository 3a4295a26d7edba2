//! Synchronous publish/subscribe dispatcher.
//!
//! Delivery happens inside `publish`, in subscription order, for listeners of the event's
//! kind only. A listener that errors or panics is logged and counted; the remaining listeners
//! still run and the publisher never sees the failure.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::error::SsoError;

use super::types::{EventKind, SsoEvent};

pub trait SsoEventListener: Send + Sync {
    fn name(&self) -> &str;
    /// Listeners must not block on long I/O here; dispatch runs on the caller's thread.
    fn handle_event(&self, event: &SsoEvent) -> anyhow::Result<()>;
}

struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> SsoEventListener for FnListener<F>
where
    F: Fn(&SsoEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str { &self.name }
    fn handle_event(&self, event: &SsoEvent) -> anyhow::Result<()> { (self.f)(event) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<EventKind, Vec<Arc<dyn SsoEventListener>>>>,
}

impl EventBus {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self, kind: EventKind, listener: Arc<dyn SsoEventListener>) {
        self.subscriptions.write().entry(kind).or_default().push(listener);
    }

    pub fn subscribe_fn<F>(&self, kind: EventKind, name: impl Into<String>, f: F)
    where
        F: Fn(&SsoEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnListener { name: name.into(), f }));
    }

    pub fn subscribe_all(&self, listener: Arc<dyn SsoEventListener>) {
        let mut subs = self.subscriptions.write();
        for kind in EventKind::ALL {
            subs.entry(kind).or_default().push(listener.clone());
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.subscriptions.read().get(&kind).map(|v| v.len()).unwrap_or(0)
    }

    pub fn publish(&self, event: &SsoEvent) -> DispatchOutcome {
        let kind = event.kind();
        // Snapshot so listeners may subscribe while being dispatched to.
        let listeners: Vec<Arc<dyn SsoEventListener>> =
            self.subscriptions.read().get(&kind).cloned().unwrap_or_default();
        let mut outcome = DispatchOutcome::default();
        for listener in listeners {
            let reason = match catch_unwind(AssertUnwindSafe(|| listener.handle_event(event))) {
                Ok(Ok(())) => {
                    outcome.delivered += 1;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            outcome.failed += 1;
            let err = SsoError::ListenerFailure { listener: listener.name().to_string(), reason };
            warn!(target: "ssoward::events", event = %kind, "{}", err);
        }
        outcome
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
