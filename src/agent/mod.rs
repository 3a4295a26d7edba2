//! Partner-app side of SSO: local session shadows bound to global sessions, the agent that
//! tracks them for one partner app, and an in-process invalidation directory.

mod shadow;
mod partner;
mod directory;

pub use shadow::{LocalSessionShadow, ShadowState};
pub use partner::PartnerAgent;
pub use directory::LocalAgentDirectory;

#[cfg(test)]
mod agent_tests;
