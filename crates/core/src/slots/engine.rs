use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::domain::meeting::{MeetingContext, SlotName};
use crate::slots::states::{Completion, SlotPrompt, SlotState, SlotStep};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SlotTransitionError {
    #[error("a meeting dialogue is already waiting for `{pending}`")]
    AlreadyActive { pending: SlotName },
    #[error("no slot question is pending (state {state:?})")]
    NothingPending { state: SlotState },
}

/// Drives a [`MeetingContext`] through `Idle -> AwaitingSlot -> Complete`.
///
/// The engine holds no state of its own; the context is owned by the
/// session store and passed in for every step.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotFillingEngine;

impl SlotFillingEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn start(
        &self,
        current: Option<&MeetingContext>,
        initial_message: &str,
        missing_slots: Vec<SlotName>,
    ) -> Result<(MeetingContext, SlotStep), SlotTransitionError> {
        if let Some(pending) = current.and_then(MeetingContext::pending_slot) {
            return Err(SlotTransitionError::AlreadyActive { pending });
        }

        let mut context = MeetingContext::new(initial_message, missing_slots);
        let step = self.ask_next(&mut context);
        Ok((context, step))
    }

    /// Prompt for the front slot, or finish the dialogue when none remain.
    pub fn ask_next(&self, context: &mut MeetingContext) -> SlotStep {
        let Some(next) = context.missing_slots.front().copied() else {
            context.active = false;
            return SlotStep::Complete(completion(context));
        };

        SlotStep::Prompt(SlotPrompt { slot: next, text: prompt_text(next, context) })
    }

    /// Record `answer` for the pending slot. The text is stored verbatim.
    pub fn submit(
        &self,
        context: &mut MeetingContext,
        answer: &str,
    ) -> Result<SlotStep, SlotTransitionError> {
        if !context.active {
            return Err(SlotTransitionError::NothingPending { state: SlotState::of(context) });
        }
        let Some(slot) = context.missing_slots.pop_front() else {
            context.active = false;
            return Err(SlotTransitionError::NothingPending { state: SlotState::Complete });
        };

        context.collected_slots.insert(slot, answer.trim().to_string());
        Ok(self.ask_next(context))
    }

    /// Restart collection of date and time on a context built by
    /// [`MeetingContext::rearmed`].
    pub fn rearm(&self, context: &mut MeetingContext) -> SlotStep {
        context.active = true;
        context.missing_slots = [SlotName::Date, SlotName::Time].into_iter().collect();
        context.collected_slots.retain(|slot, _| !slot.is_temporal());
        context.is_rescheduling = context.target_event_id.is_some();
        self.ask_next(context)
    }

    pub fn submit_with_audit<S>(
        &self,
        context: &mut MeetingContext,
        answer: &str,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<SlotStep, SlotTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let answered = context.pending_slot();
        let result = self.submit(context, answer);
        match &result {
            Ok(step) => {
                let next = match step {
                    SlotStep::Prompt(prompt) => prompt.slot.as_str(),
                    SlotStep::Complete(Completion::Create { .. }) => "complete:create",
                    SlotStep::Complete(Completion::Reschedule { .. }) => "complete:reschedule",
                };
                sink.record(
                    audit
                        .record("slot.answer_recorded", AuditCategory::Slot, AuditOutcome::Success)
                        .detail("slot", answered.map(|slot| slot.as_str()).unwrap_or("none"))
                        .detail("next", next),
                );
            }
            Err(error) => {
                sink.record(
                    audit
                        .record(
                            "slot.transition_rejected",
                            AuditCategory::Slot,
                            AuditOutcome::Rejected,
                        )
                        .detail("error", error.to_string()),
                );
            }
        }
        result
    }
}

fn completion(context: &MeetingContext) -> Completion {
    match (&context.target_event_id, context.is_rescheduling) {
        (Some(target_event_id), true) => Completion::Reschedule {
            target_event_id: target_event_id.clone(),
            collected: context.collected_slots.clone(),
        },
        _ => Completion::Create { combined_message: combined_message(context) },
    }
}

/// `"{initial} Title: t. Date: d. Time: tm. Participants: p."` with only
/// the collected segments present.
pub fn combined_message(context: &MeetingContext) -> String {
    let mut message = context.initial_message.trim().to_string();
    for (slot, value) in &context.collected_slots {
        if !message.is_empty() {
            message.push(' ');
        }
        message.push_str(slot.label());
        message.push_str(": ");
        message.push_str(value);
        message.push('.');
    }
    message
}

fn prompt_text(slot: SlotName, context: &MeetingContext) -> String {
    let question = match slot {
        SlotName::Title => "What is the title or topic of the meeting?",
        SlotName::Date => {
            "On what date should the meeting be scheduled? (Please use YYYY-MM-DD format, e.g., 2023-12-31)"
        }
        SlotName::Time => {
            "What time should the meeting be scheduled? (Please use the 24-hour HH:MM format, e.g., 14:30)"
        }
        SlotName::Participants => "Who should attend the meeting? Please list all participants.",
    };

    let both_temporal_missing = context.missing_slots.contains(&SlotName::Date)
        && context.missing_slots.contains(&SlotName::Time);
    let suffix = if context.is_rescheduling {
        " for rescheduling"
    } else if slot.is_temporal() && both_temporal_missing {
        " (please ensure it's a future date and time)"
    } else {
        ""
    };

    format!("{question}{suffix}")
}
