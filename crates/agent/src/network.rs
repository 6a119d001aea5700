//! The agent registry: profiles, per-agent mirrors and inboxes, tasks, and
//! the messaging collaborator.
//!
//! One [`Network`] is built at startup and shared by `Arc`. Its lock is a
//! plain `std::sync::RwLock` and is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use huddle_core::clock::Clock;
use huddle_core::domain::agent::{AgentId, AgentProfile};
use huddle_core::domain::calendar::MirrorEntry;
use huddle_core::domain::task::{Task, TaskId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InboxMessage {
    pub from: AgentId,
    pub to: AgentId,
    pub text: String,
    pub sent_at: NaiveDateTime,
}

/// Fire-and-forget delivery of one-line notifications. Delivery is at most
/// once; the only guarantee is a log line.
pub trait Messenger: Send + Sync {
    fn send_notification(&self, from: &AgentId, to: &AgentId, text: &str);
}

#[derive(Default)]
struct AgentState {
    mirror: Vec<MirrorEntry>,
    inbox: Vec<InboxMessage>,
}

#[derive(Default)]
struct NetworkState {
    profiles: BTreeMap<AgentId, AgentProfile>,
    agents: HashMap<AgentId, AgentState>,
    tasks: Vec<Task>,
}

pub struct Network {
    state: RwLock<NetworkState>,
    clock: Arc<dyn Clock>,
}

impl Network {
    pub fn new(roster: Vec<AgentProfile>, clock: Arc<dyn Clock>) -> Self {
        let network = Self { state: RwLock::new(NetworkState::default()), clock };
        for profile in roster {
            network.register(profile);
        }
        network
    }

    fn read(&self) -> RwLockReadGuard<'_, NetworkState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, NetworkState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, profile: AgentProfile) {
        let mut state = self.write();
        state.agents.entry(profile.id.clone()).or_default();
        state.profiles.insert(profile.id.clone(), profile);
    }

    pub fn is_registered(&self, agent: &AgentId) -> bool {
        self.read().profiles.contains_key(agent)
    }

    pub fn profile(&self, agent: &AgentId) -> Option<AgentProfile> {
        self.read().profiles.get(agent).cloned()
    }

    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.read().profiles.values().cloned().collect()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.read().profiles.keys().cloned().collect()
    }

    /// Mirror entries ordered by start; local entries without a start sort
    /// last.
    pub fn mirror(&self, agent: &AgentId) -> Vec<MirrorEntry> {
        let mut entries =
            self.read().agents.get(agent).map(|state| state.mirror.clone()).unwrap_or_default();
        entries.sort_by_key(|entry| (entry.start.is_none(), entry.start));
        entries
    }

    /// Returns false when `agent` is not registered.
    pub fn append_mirror(&self, agent: &AgentId, entry: MirrorEntry) -> bool {
        let mut state = self.write();
        match state.agents.get_mut(agent) {
            Some(agent_state) => {
                agent_state.mirror.push(entry);
                true
            }
            None => false,
        }
    }

    /// Applies `update` to the entry with `key` in place. Returns whether an
    /// entry was found.
    pub fn update_mirror<F>(&self, agent: &AgentId, key: &str, update: F) -> bool
    where
        F: FnOnce(&mut MirrorEntry),
    {
        let mut state = self.write();
        let entry = state
            .agents
            .get_mut(agent)
            .and_then(|agent_state| agent_state.mirror.iter_mut().find(|entry| entry.key() == key));
        match entry {
            Some(entry) => {
                update(entry);
                true
            }
            None => false,
        }
    }

    pub fn remove_mirror(&self, agent: &AgentId, key: &str) -> bool {
        let mut state = self.write();
        let Some(agent_state) = state.agents.get_mut(agent) else {
            return false;
        };
        let before = agent_state.mirror.len();
        agent_state.mirror.retain(|entry| entry.key() != key);
        agent_state.mirror.len() != before
    }

    pub fn inbox(&self, agent: &AgentId) -> Vec<InboxMessage> {
        self.read().agents.get(agent).map(|state| state.inbox.clone()).unwrap_or_default()
    }

    /// Stores the task and tells the assignee about it.
    pub fn add_task(&self, task: Task) {
        let text = format!(
            "New task assigned: {}. Due: {}. Priority: {}.",
            task.title,
            task.due_date.format("%Y-%m-%d"),
            task.priority
        );
        let assignee = task.assigned_to.clone();
        self.write().tasks.push(task);
        self.send_notification(&AgentId::system(), &assignee, &text);
    }

    pub fn tasks_for(&self, agent: &AgentId) -> Vec<Task> {
        self.read().tasks.iter().filter(|task| &task.assigned_to == agent).cloned().collect()
    }

    pub fn complete_task(&self, id: &TaskId) -> bool {
        let mut state = self.write();
        match state.tasks.iter_mut().find(|task| &task.id == id) {
            Some(task) => {
                task.mark_completed();
                true
            }
            None => false,
        }
    }
}

impl Messenger for Network {
    fn send_notification(&self, from: &AgentId, to: &AgentId, text: &str) {
        let message = InboxMessage {
            from: from.clone(),
            to: to.clone(),
            text: text.to_string(),
            sent_at: self.clock.now(),
        };

        let delivered = {
            let mut state = self.write();
            match state.agents.get_mut(to) {
                Some(agent_state) => {
                    agent_state.inbox.push(message);
                    true
                }
                None => false,
            }
        };

        info!(
            event_name = "notification.sent",
            from = %from,
            to = %to,
            delivered,
            text = %text,
            "notification sent"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};

    use huddle_core::clock::FixedClock;
    use huddle_core::config::default_roster;
    use huddle_core::domain::agent::AgentId;
    use huddle_core::domain::calendar::MirrorEntry;
    use huddle_core::domain::task::{Task, TaskPriority};

    use super::{Messenger, Network};

    fn noon(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2031, 3, day)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid timestamp")
    }

    fn network() -> Network {
        Network::new(default_roster(), Arc::new(FixedClock(noon(5))))
    }

    fn entry(key: &str, start: Option<NaiveDateTime>) -> MirrorEntry {
        MirrorEntry {
            meeting_id: key.to_string(),
            event_id: None,
            title: key.to_string(),
            summary_text: key.to_string(),
            start,
            end: None,
            participants: vec![AgentId::new("ceo")],
        }
    }

    #[test]
    fn mirror_updates_happen_in_place_and_removals_by_key() {
        let network = network();
        let ceo = AgentId::new("ceo");

        assert!(network.append_mirror(&ceo, entry("later", Some(noon(9)))));
        assert!(network.append_mirror(&ceo, entry("local", None)));
        assert!(network.append_mirror(&ceo, entry("sooner", Some(noon(6)))));
        assert!(!network.append_mirror(&AgentId::new("finance"), entry("x", None)));

        let keys: Vec<String> = network.mirror(&ceo).into_iter().map(|e| e.meeting_id).collect();
        assert_eq!(keys, vec!["sooner", "later", "local"]);

        assert!(network.update_mirror(&ceo, "later", |entry| entry.summary_text = "moved".into()));
        assert!(!network.update_mirror(&ceo, "missing", |_| {}));
        assert_eq!(network.mirror(&ceo)[1].summary_text, "moved");

        assert!(network.remove_mirror(&ceo, "later"));
        assert!(!network.remove_mirror(&ceo, "later"));
        assert_eq!(network.mirror(&ceo).len(), 2);
    }

    #[test]
    fn notifications_land_in_inbox_only_for_registered_agents() {
        let network = network();
        let design = AgentId::new("design");

        network.send_notification(&AgentId::new("ceo"), &design, "hello");
        network.send_notification(&AgentId::new("ceo"), &AgentId::new("finance"), "lost");

        let inbox = network.inbox(&design);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].text, "hello");
        assert_eq!(inbox[0].sent_at, noon(5));
        assert!(network.inbox(&AgentId::new("finance")).is_empty());
    }

    #[test]
    fn task_assignment_notifies_assignee_from_system() {
        let network = network();
        let engineering = AgentId::new("engineering");

        let task = Task::new(
            "T-1",
            "Ship beta",
            "Cut the beta build",
            noon(12),
            engineering.clone(),
            TaskPriority::High,
            "launch",
        );
        let task_id = task.id.clone();
        network.add_task(task);

        let inbox = network.inbox(&engineering);
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].from, AgentId::system());
        assert_eq!(inbox[0].text, "New task assigned: Ship beta. Due: 2031-03-12. Priority: high.");

        assert!(network.complete_task(&task_id));
        assert!(network.tasks_for(&engineering)[0].is_completed());
        assert!(network.tasks_for(&AgentId::new("design")).is_empty());
    }
}
