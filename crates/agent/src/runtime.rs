//! Per-agent message handling.
//!
//! One [`AgentRuntime`] per registered agent. A turn either continues the
//! agent's active meeting dialogue or classifies the text and dispatches a
//! calendar action.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use huddle_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use huddle_core::domain::agent::AgentId;
use huddle_core::domain::meeting::{MeetingContext, SlotName};
use huddle_core::errors::{ApplicationError, DomainError, FailureKind};
use huddle_core::slots::{Completion, SlotFillingEngine, SlotStep, SlotTransitionError};

use crate::network::Network;
use crate::orchestrator::{SchedulingOrchestrator, SchedulingOutcome};
use crate::session::SessionStore;
use crate::tasks::parse_task_command;
use crate::understanding::{CalendarAction, IntentClassifier};

pub const UNKNOWN_ACTION_REPLY: &str = "Sorry, I don't know how to handle that calendar request.";

/// Result of one turn. `lines` are the user-facing status lines without the
/// `Response:` prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentReply {
    pub agent_id: AgentId,
    pub correlation_id: String,
    pub lines: Vec<String>,
    pub outcome: Option<SchedulingOutcome>,
}

impl AgentReply {
    pub fn response_lines(&self) -> Vec<String> {
        self.lines.iter().map(|line| format!("Response: {line}")).collect()
    }
}

pub struct AgentRuntime {
    agent_id: AgentId,
    classifier: Arc<dyn IntentClassifier>,
    orchestrator: Arc<SchedulingOrchestrator>,
    sessions: Arc<SessionStore>,
    audit: Arc<dyn AuditSink>,
    engine: SlotFillingEngine,
    turn: Mutex<()>,
}

impl AgentRuntime {
    pub fn new(
        agent_id: AgentId,
        classifier: Arc<dyn IntentClassifier>,
        orchestrator: Arc<SchedulingOrchestrator>,
        sessions: Arc<SessionStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            agent_id,
            classifier,
            orchestrator,
            sessions,
            audit,
            engine: SlotFillingEngine::new(),
            turn: Mutex::new(()),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Handle one message. Turns of the same agent are serialized for the
    /// whole call, including collaborator awaits.
    pub async fn receive_message(&self, text: &str, origin: &str) -> AgentReply {
        let _turn = self.turn.lock().await;
        let audit = AuditContext::turn(self.agent_id.clone(), origin);
        self.audit.record(
            audit
                .record("message.received", AuditCategory::Ingress, AuditOutcome::Success)
                .detail("origin", origin),
        );
        debug!(
            event_name = "message.received",
            agent_id = %self.agent_id,
            correlation_id = %audit.correlation_id,
            origin,
            "message received"
        );

        if let Some(context) = self.sessions.active(&self.agent_id).await {
            return self.continue_dialogue(context, text, &audit).await;
        }

        if let Some(command) = parse_task_command(text) {
            let outcome =
                self.orchestrator.handle_task_command(&self.agent_id, command, &audit).await;
            return self.reply(&audit, outcome.render(), None);
        }

        let intent = match self.classifier.classify_calendar_intent(text).await {
            Ok(intent) => intent,
            Err(error) => {
                let kind = FailureKind::Classification;
                warn!(
                    event_name = "calendar.intent.classified",
                    agent_id = %self.agent_id,
                    correlation_id = %audit.correlation_id,
                    reason = kind.code(),
                    error = %error,
                    "classification failed, answering conversationally"
                );
                self.audit.record(
                    audit
                        .record("calendar.intent.classified", AuditCategory::Ingress, AuditOutcome::Failed)
                        .because(kind)
                        .detail("error", error.to_string()),
                );
                return self.reply(&audit, vec![self.conversational_line()], None);
            }
        };
        info!(
            event_name = "calendar.intent.classified",
            agent_id = %self.agent_id,
            correlation_id = %audit.correlation_id,
            is_calendar_command = intent.is_calendar_command,
            action = intent.action.map(|action| action.as_str()).unwrap_or("none"),
            missing = intent.missing_info.len(),
            "calendar intent classified"
        );

        if !intent.is_calendar_command {
            return self.reply(&audit, vec![self.conversational_line()], None);
        }
        let Some(action) = intent.action else {
            return self.reply(&audit, vec![UNKNOWN_ACTION_REPLY.to_string()], None);
        };

        let outcome = match action {
            CalendarAction::ScheduleMeeting if !intent.missing_info.is_empty() => {
                return self.start_dialogue(text, intent.missing_info, &audit).await;
            }
            CalendarAction::ScheduleMeeting => {
                self.orchestrator.schedule_from_text(&self.agent_id, text, &audit).await
            }
            CalendarAction::RescheduleMeeting => {
                self.orchestrator.reschedule_meeting(&self.agent_id, text, &audit).await
            }
            CalendarAction::CancelMeeting => {
                self.orchestrator.cancel_meeting(&self.agent_id, text, &audit).await
            }
            CalendarAction::ListMeetings => self.orchestrator.list_meetings(&self.agent_id).await,
        };
        self.finish(&audit, outcome).await
    }

    async fn start_dialogue(
        &self,
        text: &str,
        missing: Vec<SlotName>,
        audit: &AuditContext,
    ) -> AgentReply {
        match self.engine.start(None, text, missing) {
            Ok((context, SlotStep::Prompt(prompt))) => {
                self.prompted(audit, prompt.slot);
                self.sessions.store(&self.agent_id, context).await;
                self.reply(audit, vec![prompt.text], None)
            }
            Ok((_, SlotStep::Complete(completion))) => self.complete(audit, "", completion).await,
            Err(error) => self.transition_failed(audit, error).await,
        }
    }

    async fn continue_dialogue(
        &self,
        mut context: MeetingContext,
        answer: &str,
        audit: &AuditContext,
    ) -> AgentReply {
        match self.engine.submit_with_audit(&mut context, answer, self.audit.as_ref(), audit) {
            Ok(SlotStep::Prompt(prompt)) => {
                self.prompted(audit, prompt.slot);
                self.sessions.store(&self.agent_id, context).await;
                self.reply(audit, vec![prompt.text], None)
            }
            Ok(SlotStep::Complete(completion)) => {
                self.sessions.clear(&self.agent_id).await;
                self.complete(audit, &context.initial_message, completion).await
            }
            Err(error) => self.transition_failed(audit, error).await,
        }
    }

    async fn complete(
        &self,
        audit: &AuditContext,
        initial_message: &str,
        completion: Completion,
    ) -> AgentReply {
        let outcome = match completion {
            Completion::Create { combined_message } => {
                self.orchestrator.schedule_from_text(&self.agent_id, &combined_message, audit).await
            }
            Completion::Reschedule { target_event_id, collected } => {
                self.orchestrator
                    .complete_reschedule(
                        &self.agent_id,
                        initial_message,
                        &target_event_id,
                        &collected,
                        audit,
                    )
                    .await
            }
        };
        self.finish(audit, outcome).await
    }

    async fn finish(&self, audit: &AuditContext, outcome: SchedulingOutcome) -> AgentReply {
        if let SchedulingOutcome::RetryRequested(retry) = &outcome {
            self.prompted(audit, retry.prompt.slot);
            self.sessions.store(&self.agent_id, retry.context.clone()).await;
        }
        self.reply(audit, outcome.render(), Some(outcome))
    }

    async fn transition_failed(&self, audit: &AuditContext, error: SlotTransitionError) -> AgentReply {
        self.sessions.clear(&self.agent_id).await;
        let interface = ApplicationError::from(DomainError::from(error))
            .into_interface(audit.correlation_id.clone());
        warn!(
            event_name = "slot.transition_rejected",
            agent_id = %self.agent_id,
            correlation_id = %audit.correlation_id,
            error = %interface,
            "meeting dialogue reset"
        );
        self.reply(audit, vec![interface.user_message().to_string()], None)
    }

    fn prompted(&self, audit: &AuditContext, slot: SlotName) {
        info!(
            event_name = "slot.prompted",
            agent_id = %self.agent_id,
            correlation_id = %audit.correlation_id,
            slot = slot.as_str(),
            "slot question asked"
        );
    }

    fn conversational_line(&self) -> String {
        let title = self
            .orchestrator
            .network()
            .profile(&self.agent_id)
            .map(|profile| profile.title)
            .unwrap_or_else(|| self.agent_id.to_string());
        format!("{title} here. I can schedule, reschedule, cancel or list meetings for you.")
    }

    fn reply(
        &self,
        audit: &AuditContext,
        lines: Vec<String>,
        outcome: Option<SchedulingOutcome>,
    ) -> AgentReply {
        AgentReply {
            agent_id: self.agent_id.clone(),
            correlation_id: audit.correlation_id.clone(),
            lines,
            outcome,
        }
    }
}

/// Runtimes for every agent in the network, sharing one orchestrator and
/// one session store.
pub struct AgentDirectory {
    network: Arc<Network>,
    runtimes: BTreeMap<AgentId, Arc<AgentRuntime>>,
}

impl AgentDirectory {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        orchestrator: Arc<SchedulingOrchestrator>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let network = orchestrator.network().clone();
        let sessions = Arc::new(SessionStore::new());
        let runtimes = network
            .agent_ids()
            .into_iter()
            .map(|agent| {
                let runtime = AgentRuntime::new(
                    agent.clone(),
                    classifier.clone(),
                    orchestrator.clone(),
                    sessions.clone(),
                    audit.clone(),
                );
                (agent, Arc::new(runtime))
            })
            .collect();
        Self { network, runtimes }
    }

    pub fn get(&self, agent: &AgentId) -> Option<Arc<AgentRuntime>> {
        self.runtimes.get(agent).cloned()
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.runtimes.keys().cloned().collect()
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }
}
