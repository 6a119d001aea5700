//! Intent classification and entity extraction contracts.
//!
//! Every collaborator reply is decoded into a strict schema. A reply that
//! does not fit is an [`UnderstandingError`], never coerced into shape.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use huddle_core::clock::Clock;
use huddle_core::domain::meeting::SlotName;

use crate::llm::LlmClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarAction {
    ScheduleMeeting,
    CancelMeeting,
    ListMeetings,
    RescheduleMeeting,
}

impl CalendarAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScheduleMeeting => "schedule_meeting",
            Self::CancelMeeting => "cancel_meeting",
            Self::ListMeetings => "list_meetings",
            Self::RescheduleMeeting => "reschedule_meeting",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalendarIntent {
    pub is_calendar_command: bool,
    #[serde(default)]
    pub action: Option<CalendarAction>,
    #[serde(default)]
    pub missing_info: Vec<SlotName>,
}

impl CalendarIntent {
    pub fn not_calendar() -> Self {
        Self::default()
    }
}

/// Empty strings mean "not specified".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeetingDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default, deserialize_with = "blank_or_minutes")]
    pub duration: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReschedulingDetails {
    #[serde(default)]
    pub meeting_identifier: String,
    #[serde(default)]
    pub original_date: Option<String>,
    #[serde(default)]
    pub new_date: String,
    #[serde(default)]
    pub new_time: String,
    #[serde(default, deserialize_with = "blank_or_minutes")]
    pub new_duration: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancellationDetails {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub with_participants: Vec<String>,
    #[serde(default)]
    pub date: Option<String>,
}

/// Minutes given as a number, a numeric string, `""` or `null`.
fn blank_or_minutes<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Minutes {
        Number(u32),
        Text(String),
    }

    match Option::<Minutes>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Minutes::Number(minutes)) => Ok(Some(minutes)),
        Some(Minutes::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Minutes::Text(text)) => text
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("expected minutes, got \"{text}\""))),
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnderstandingError {
    #[error("classifier reply did not match the intent schema: {0}")]
    Classification(String),
    #[error("extractor reply did not match the {schema} schema: {message}")]
    Extraction { schema: &'static str, message: String },
    #[error("understanding service call failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify_calendar_intent(
        &self,
        text: &str,
    ) -> Result<CalendarIntent, UnderstandingError>;
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    async fn extract_meeting_details(&self, text: &str)
        -> Result<MeetingDetails, UnderstandingError>;

    async fn extract_rescheduling_details(
        &self,
        text: &str,
    ) -> Result<ReschedulingDetails, UnderstandingError>;

    async fn extract_cancellation_details(
        &self,
        text: &str,
    ) -> Result<CancellationDetails, UnderstandingError>;
}

/// Classifier and extractor backed by a text-completion model.
pub struct LlmUnderstanding<C> {
    client: C,
    clock: Arc<dyn Clock>,
}

impl<C: LlmClient> LlmUnderstanding<C> {
    pub fn new(client: C, clock: Arc<dyn Clock>) -> Self {
        Self { client, clock }
    }

    async fn ask(&self, prompt: String) -> Result<String, UnderstandingError> {
        self.client
            .complete(&prompt)
            .await
            .map_err(|error| UnderstandingError::Transport(format!("{error:#}")))
    }

    fn today(&self) -> String {
        self.clock.today().format("%Y-%m-%d").to_string()
    }
}

const CLASSIFY_PROMPT: &str = r#"Decide whether the message below is a calendar command.
Reply with one JSON object and nothing else:
{"is_calendar_command": true|false,
 "action": "schedule_meeting"|"cancel_meeting"|"list_meetings"|"reschedule_meeting"|null,
 "missing_info": [zero or more of "title", "date", "time", "participants"]}
Only fill "missing_info" for schedule_meeting, listing the details the message does not give."#;

const MEETING_PROMPT: &str = r#"Extract meeting details from the message below.
Reply with one JSON object and nothing else:
{"title": string, "participants": [role names], "date": "YYYY-MM-DD", "time": "HH:MM" (24-hour), "duration": minutes or null}
Use an empty string for any text field the message does not state and null for a missing duration."#;

const RESCHEDULE_PROMPT: &str = r#"Extract rescheduling details from the message below.
Reply with one JSON object and nothing else:
{"meeting_identifier": words naming the meeting, "original_date": "YYYY-MM-DD" or null,
 "new_date": "YYYY-MM-DD", "new_time": "HH:MM" (24-hour), "new_duration": minutes or null}
Use an empty string for any text field the message does not state and null for a missing duration."#;

const CANCEL_PROMPT: &str = r#"Extract cancellation details from the message below.
Reply with one JSON object and nothing else:
{"title": title words or null, "with_participants": [role names], "date": "YYYY-MM-DD" or null}
Use null or an empty list for anything the message does not state."#;

fn build_prompt(instructions: &str, today: &str, text: &str) -> String {
    format!("{instructions}\nToday is {today}.\n\nMessage:\n{text}")
}

/// Cut the outermost JSON object out of a reply that may carry code fences
/// or surrounding prose.
pub fn json_payload(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end >= start).then(|| &reply[start..=end])
}

fn decode<T: DeserializeOwned>(reply: &str) -> Result<T, String> {
    let payload = json_payload(reply).ok_or_else(|| "reply carries no JSON object".to_string())?;
    serde_json::from_str(payload).map_err(|error| error.to_string())
}

#[async_trait]
impl<C: LlmClient> IntentClassifier for LlmUnderstanding<C> {
    async fn classify_calendar_intent(
        &self,
        text: &str,
    ) -> Result<CalendarIntent, UnderstandingError> {
        let reply = self.ask(build_prompt(CLASSIFY_PROMPT, &self.today(), text)).await?;
        decode(&reply).map_err(UnderstandingError::Classification)
    }
}

#[async_trait]
impl<C: LlmClient> EntityExtractor for LlmUnderstanding<C> {
    async fn extract_meeting_details(
        &self,
        text: &str,
    ) -> Result<MeetingDetails, UnderstandingError> {
        let reply = self.ask(build_prompt(MEETING_PROMPT, &self.today(), text)).await?;
        decode(&reply)
            .map_err(|message| UnderstandingError::Extraction { schema: "meeting", message })
    }

    async fn extract_rescheduling_details(
        &self,
        text: &str,
    ) -> Result<ReschedulingDetails, UnderstandingError> {
        let reply = self.ask(build_prompt(RESCHEDULE_PROMPT, &self.today(), text)).await?;
        decode(&reply)
            .map_err(|message| UnderstandingError::Extraction { schema: "rescheduling", message })
    }

    async fn extract_cancellation_details(
        &self,
        text: &str,
    ) -> Result<CancellationDetails, UnderstandingError> {
        let reply = self.ask(build_prompt(CANCEL_PROMPT, &self.today(), text)).await?;
        decode(&reply)
            .map_err(|message| UnderstandingError::Extraction { schema: "cancellation", message })
    }
}
