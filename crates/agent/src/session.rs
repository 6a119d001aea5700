use std::collections::HashMap;

use tokio::sync::RwLock;

use huddle_core::domain::agent::AgentId;
use huddle_core::domain::meeting::MeetingContext;

/// At most one meeting dialogue per agent. Inactive contexts are dropped
/// on write, so a stored context is always an active one.
#[derive(Default)]
pub struct SessionStore {
    contexts: RwLock<HashMap<AgentId, MeetingContext>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn active(&self, agent: &AgentId) -> Option<MeetingContext> {
        let contexts = self.contexts.read().await;
        contexts.get(agent).filter(|context| context.active).cloned()
    }

    pub async fn is_active(&self, agent: &AgentId) -> bool {
        self.active(agent).await.is_some()
    }

    pub async fn store(&self, agent: &AgentId, context: MeetingContext) {
        let mut contexts = self.contexts.write().await;
        if context.active {
            contexts.insert(agent.clone(), context);
        } else {
            contexts.remove(agent);
        }
    }

    pub async fn clear(&self, agent: &AgentId) {
        let mut contexts = self.contexts.write().await;
        contexts.remove(agent);
    }
}

#[cfg(test)]
mod tests {
    use huddle_core::domain::agent::AgentId;
    use huddle_core::domain::meeting::{MeetingContext, SlotName};

    use super::SessionStore;

    #[tokio::test]
    async fn contexts_are_isolated_per_agent() {
        let sessions = SessionStore::new();
        let marketing = AgentId::new("marketing");
        let design = AgentId::new("design");

        sessions.store(&marketing, MeetingContext::new("sync", vec![SlotName::Date])).await;

        assert!(sessions.is_active(&marketing).await);
        assert!(!sessions.is_active(&design).await);

        sessions.clear(&marketing).await;
        assert!(sessions.active(&marketing).await.is_none());
    }

    #[tokio::test]
    async fn storing_an_inactive_context_clears_the_slot() {
        let sessions = SessionStore::new();
        let ceo = AgentId::new("ceo");
        sessions.store(&ceo, MeetingContext::new("sync", vec![SlotName::Time])).await;

        let mut finished = MeetingContext::new("sync", Vec::new());
        finished.active = false;
        sessions.store(&ceo, finished).await;

        assert!(!sessions.is_active(&ceo).await);
    }
}
