//! In-process event bus for authentication and session lifecycle events, plus the
//! listeners shipped with the authority (audit trail, login failure monitor).

mod types;
mod bus;
mod audit;
mod monitor;

pub use types::{EventMeta, SsoEvent, EventKind};
pub use bus::{EventBus, SsoEventListener, DispatchOutcome};
pub use audit::{AuditRecord, AuditSink, AuditListener, JsonLinesAuditSink};
pub use monitor::LoginFailureMonitor;
