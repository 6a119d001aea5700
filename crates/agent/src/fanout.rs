use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use huddle_core::domain::agent::AgentId;
use huddle_core::domain::calendar::MirrorEntry;

use crate::network::{Messenger, Network};

/// Who heard about a meeting change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub notified: Vec<AgentId>,
    pub skipped: Vec<String>,
}

/// New placement of a rescheduled meeting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorMove {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub summary_text: String,
}

/// Propagates meeting changes to every participant except the initiator.
/// Participants outside the registry are skipped without error.
#[derive(Clone)]
pub struct NotificationFanout {
    network: Arc<Network>,
}

impl NotificationFanout {
    pub fn new(network: Arc<Network>) -> Self {
        Self { network }
    }

    pub fn meeting_created(
        &self,
        initiator: &AgentId,
        entry: &MirrorEntry,
        text: &str,
    ) -> FanoutReport {
        let participants: Vec<String> =
            entry.participants.iter().map(|agent| agent.as_str().to_string()).collect();
        self.each_participant(initiator, &participants, text, |agent| {
            self.network.append_mirror(agent, entry.clone());
        })
    }

    pub fn meeting_rescheduled(
        &self,
        initiator: &AgentId,
        key: &str,
        participants: &[String],
        moved: &MirrorMove,
        text: &str,
    ) -> FanoutReport {
        self.each_participant(initiator, participants, text, |agent| {
            self.network.update_mirror(agent, key, |entry| {
                entry.start = Some(moved.start);
                entry.end = Some(moved.end);
                entry.summary_text = moved.summary_text.clone();
            });
        })
    }

    pub fn meeting_cancelled(
        &self,
        initiator: &AgentId,
        key: &str,
        participants: &[String],
        text: &str,
    ) -> FanoutReport {
        self.each_participant(initiator, participants, text, |agent| {
            self.network.remove_mirror(agent, key);
        })
    }

    fn each_participant<F>(
        &self,
        initiator: &AgentId,
        participants: &[String],
        text: &str,
        mut touch_mirror: F,
    ) -> FanoutReport
    where
        F: FnMut(&AgentId),
    {
        let mut report = FanoutReport::default();

        for participant in participants {
            let agent = AgentId::new(participant);
            if &agent == initiator || report.notified.contains(&agent) {
                continue;
            }
            if !self.network.is_registered(&agent) {
                debug!(
                    event_name = "notification.skipped_unknown",
                    participant = %participant,
                    "participant is not a registered agent"
                );
                report.skipped.push(participant.clone());
                continue;
            }

            touch_mirror(&agent);
            self.network.send_notification(initiator, &agent, text);
            report.notified.push(agent);
        }

        report
    }
}
