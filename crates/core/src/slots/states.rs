use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::meeting::{MeetingContext, SlotName};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    Idle,
    AwaitingSlot(SlotName),
    Complete,
}

impl SlotState {
    pub fn of(context: &MeetingContext) -> Self {
        match (context.active, context.missing_slots.front()) {
            (false, _) => Self::Idle,
            (true, Some(slot)) => Self::AwaitingSlot(*slot),
            (true, None) => Self::Complete,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPrompt {
    pub slot: SlotName,
    pub text: String,
}

/// What to do once every missing slot has an answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completion {
    Create { combined_message: String },
    Reschedule { target_event_id: String, collected: BTreeMap<SlotName, String> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStep {
    Prompt(SlotPrompt),
    Complete(Completion),
}
