//! Per-turn audit trail.
//!
//! Serving one message opens one [`AuditContext`]. Every record made while
//! serving it carries the context, so a whole turn can be read back from a
//! sink by correlation id.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::agent::AgentId;
use crate::errors::FailureKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Ingress,
    Slot,
    Calendar,
    Task,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

/// The agent serving a turn and where the message came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditContext {
    pub agent_id: AgentId,
    pub origin: String,
    pub correlation_id: String,
}

impl AuditContext {
    /// Opens a turn under a fresh correlation id.
    pub fn turn(agent_id: AgentId, origin: impl Into<String>) -> Self {
        Self::with_correlation(agent_id, origin, Uuid::new_v4().to_string())
    }

    pub fn with_correlation(
        agent_id: AgentId,
        origin: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self { agent_id, origin: origin.into(), correlation_id: correlation_id.into() }
    }

    pub fn record(
        &self,
        action: &'static str,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> AuditRecord {
        AuditRecord {
            record_id: Uuid::new_v4(),
            turn: self.clone(),
            action,
            category,
            outcome,
            reason: None,
            details: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub turn: AuditContext,
    pub action: &'static str,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub reason: Option<FailureKind>,
    pub details: BTreeMap<&'static str, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn detail(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.details.insert(key, value.into());
        self
    }

    pub fn because(mut self, reason: FailureKind) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn detail_value(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Keeps every record in memory. Used by tests and the interactive chat.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    fn guard(&self) -> MutexGuard<'_, Vec<AuditRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.guard().clone()
    }

    /// Actions in the order they were recorded.
    pub fn actions(&self) -> Vec<&'static str> {
        self.guard().iter().map(|record| record.action).collect()
    }

    pub fn for_turn(&self, correlation_id: &str) -> Vec<AuditRecord> {
        self.guard()
            .iter()
            .filter(|record| record.turn.correlation_id == correlation_id)
            .cloned()
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.guard().push(record);
    }
}

/// Writes audit records to the `tracing` pipeline at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        let details = serde_json::to_string(&record.details).unwrap_or_default();
        tracing::debug!(
            event_name = "audit.recorded",
            action = record.action,
            category = ?record.category,
            outcome = ?record.outcome,
            reason = record.reason.map(|reason| reason.code()).unwrap_or("none"),
            agent_id = %record.turn.agent_id,
            origin = %record.turn.origin,
            correlation_id = %record.turn.correlation_id,
            details = %details,
            "audit record written"
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink, InMemoryAuditSink};
    use crate::domain::agent::AgentId;
    use crate::errors::FailureKind;

    #[test]
    fn records_of_one_turn_share_its_correlation_id() {
        let sink = InMemoryAuditSink::default();
        let turn = AuditContext::turn(AgentId::new("marketing"), "cli");
        let other = AuditContext::with_correlation(AgentId::new("ceo"), "cli", "turn-ceo");

        sink.record(turn.record("message.received", AuditCategory::Ingress, AuditOutcome::Success));
        sink.record(other.record("message.received", AuditCategory::Ingress, AuditOutcome::Success));
        sink.record(
            turn.record("meeting.created", AuditCategory::Calendar, AuditOutcome::Success)
                .detail("event_id", "evt-1"),
        );

        let records = sink.for_turn(&turn.correlation_id);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.turn.agent_id.as_str() == "marketing"));
        assert_eq!(records[1].detail_value("event_id"), Some("evt-1"));
        assert_eq!(sink.for_turn("turn-ceo").len(), 1);
    }

    #[test]
    fn rejections_carry_their_failure_kind() {
        let sink = InMemoryAuditSink::default();
        let turn = AuditContext::with_correlation(AgentId::new("design"), "test", "turn-1");
        sink.record(
            turn.record("meeting.request_rejected", AuditCategory::Calendar, AuditOutcome::Failed)
                .because(FailureKind::NoMatchFound),
        );

        let records = sink.records();
        assert_eq!(sink.actions(), vec!["meeting.request_rejected"]);
        assert_eq!(records[0].reason, Some(FailureKind::NoMatchFound));
        assert_eq!(records[0].turn.origin, "test");
    }
}
