use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A piece of meeting information that can be asked for.
///
/// Variant order is the order in which collected answers are reassembled
/// into a single instruction, so `BTreeMap<SlotName, _>` iterates title,
/// date, time, participants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Title,
    Date,
    Time,
    Participants,
}

impl SlotName {
    pub const ALL: [SlotName; 4] =
        [SlotName::Title, SlotName::Date, SlotName::Time, SlotName::Participants];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Date => "date",
            Self::Time => "time",
            Self::Participants => "participants",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Title => "Title",
            Self::Date => "Date",
            Self::Time => "Time",
            Self::Participants => "Participants",
        }
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Time)
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized slot name `{0}` (expected title|date|time|participants)")]
pub struct UnknownSlotName(pub String);

impl FromStr for SlotName {
    type Err = UnknownSlotName;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "title" => Ok(Self::Title),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "participants" => Ok(Self::Participants),
            other => Err(UnknownSlotName(other.to_string())),
        }
    }
}

/// Per-agent dialogue state for collecting missing meeting fields.
///
/// An inactive context is equivalent to having no context at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingContext {
    pub active: bool,
    pub initial_message: String,
    pub missing_slots: VecDeque<SlotName>,
    pub collected_slots: BTreeMap<SlotName, String>,
    pub is_rescheduling: bool,
    pub target_event_id: Option<String>,
}

impl MeetingContext {
    /// Fresh context for a create request. Duplicate slot names keep their
    /// first position only.
    pub fn new(initial_message: impl Into<String>, missing_slots: Vec<SlotName>) -> Self {
        let mut queue = VecDeque::with_capacity(missing_slots.len());
        for slot in missing_slots {
            if !queue.contains(&slot) {
                queue.push_back(slot);
            }
        }

        Self {
            active: true,
            initial_message: initial_message.into(),
            missing_slots: queue,
            collected_slots: BTreeMap::new(),
            is_rescheduling: false,
            target_event_id: None,
        }
    }

    /// Context asking again for date and time after a temporal validation
    /// failure. Only title and participants survive from `preserved`.
    pub fn rearmed(
        initial_message: impl Into<String>,
        preserved: BTreeMap<SlotName, String>,
        target_event_id: Option<String>,
    ) -> Self {
        let collected_slots = preserved
            .into_iter()
            .filter(|(slot, value)| !slot.is_temporal() && !value.trim().is_empty())
            .collect();

        Self {
            active: true,
            initial_message: initial_message.into(),
            missing_slots: VecDeque::from([SlotName::Date, SlotName::Time]),
            collected_slots,
            is_rescheduling: target_event_id.is_some(),
            target_event_id,
        }
    }

    pub fn pending_slot(&self) -> Option<SlotName> {
        if self.active {
            self.missing_slots.front().copied()
        } else {
            None
        }
    }

    pub fn collected(&self, slot: SlotName) -> Option<&str> {
        self.collected_slots.get(&slot).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{MeetingContext, SlotName};

    #[test]
    fn slot_names_parse_strictly() {
        assert_eq!("date".parse::<SlotName>(), Ok(SlotName::Date));
        assert_eq!("participants".parse::<SlotName>(), Ok(SlotName::Participants));
        assert!("duration".parse::<SlotName>().is_err());
        assert!("Date".parse::<SlotName>().is_err());
    }

    #[test]
    fn new_context_deduplicates_missing_slots_in_order() {
        let context = MeetingContext::new(
            "set up a sync",
            vec![SlotName::Time, SlotName::Title, SlotName::Time],
        );

        assert!(context.active);
        assert_eq!(context.missing_slots, [SlotName::Time, SlotName::Title]);
        assert_eq!(context.pending_slot(), Some(SlotName::Time));
    }

    #[test]
    fn rearmed_context_drops_temporal_answers() {
        let preserved = BTreeMap::from([
            (SlotName::Title, "Sync".to_string()),
            (SlotName::Date, "2020-01-01".to_string()),
            (SlotName::Participants, "marketing, engineering".to_string()),
        ]);

        let context = MeetingContext::rearmed("set up a sync", preserved, Some("evt-9".into()));

        assert!(context.is_rescheduling);
        assert_eq!(context.missing_slots, [SlotName::Date, SlotName::Time]);
        assert_eq!(context.collected(SlotName::Title), Some("Sync"));
        assert_eq!(context.collected(SlotName::Date), None);
        assert_eq!(context.target_event_id.as_deref(), Some("evt-9"));
    }

    #[test]
    fn inactive_context_has_no_pending_slot() {
        let context = MeetingContext::default();
        assert_eq!(context.pending_slot(), None);
    }
}
