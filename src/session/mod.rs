//! Global session registry: the single authority over SSO sessions, their single-use
//! tickets and the partner apps bound to them.

mod types;
mod notifier;
mod registry;

pub use types::{SessionId, SessionState, DestroyReason, GlobalSession, Ticket};
pub(crate) use types::elapsed_since;
pub use notifier::{InvalidationNotifier, NullNotifier, HttpInvalidationNotifier, InvalidationPayload};
pub use registry::{SessionRegistry, SsoAuthority};
