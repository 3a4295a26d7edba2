use std::collections::HashMap;
use std::sync::{Arc, Weak};

use anyhow::anyhow;
use parking_lot::RwLock;

use crate::session::{InvalidationNotifier, SessionId};

use super::partner::PartnerAgent;

/// Routes invalidations to agents living in the same process. Holds weak handles: agents
/// own an authority handle, and the authority owns this directory.
#[derive(Default)]
pub struct LocalAgentDirectory {
    agents: RwLock<HashMap<String, Weak<PartnerAgent>>>,
}

impl LocalAgentDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn register(&self, agent: &Arc<PartnerAgent>) {
        self.agents.write().insert(agent.partner_app().to_string(), Arc::downgrade(agent));
    }

    pub fn unregister(&self, partner_app: &str) -> bool {
        self.agents.write().remove(partner_app).is_some()
    }
}

impl InvalidationNotifier for LocalAgentDirectory {
    fn notify(&self, partner_app: &str, session_id: &SessionId) -> anyhow::Result<()> {
        let agent = self
            .agents
            .read()
            .get(partner_app)
            .and_then(Weak::upgrade)
            .ok_or_else(|| anyhow!("no live agent registered for partner app '{}'", partner_app))?;
        agent.on_remote_invalidated(session_id);
        Ok(())
    }
}
