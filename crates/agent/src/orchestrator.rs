//! Create, reschedule, cancel and list workflows.
//!
//! Each operation validates first, then makes at most one kind of calendar
//! mutation, then fans out. Collaborator failures are caught where they
//! happen and come back as a [`SchedulingOutcome`]; nothing here retries.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use huddle_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use huddle_core::clock::Clock;
use huddle_core::config::AppConfig;
use huddle_core::domain::agent::AgentId;
use huddle_core::domain::calendar::{
    Attendee, CalendarEvent, EventTime, MirrorEntry, NewEvent, Reminder, ReminderMethod,
};
use huddle_core::domain::meeting::{MeetingContext, SlotName};
use huddle_core::domain::task::{Task, TaskId, TaskPriority};
use huddle_core::errors::FailureKind;
use huddle_core::matcher::{CancellationCriteria, EventMatcher, MatchQuery};
use huddle_core::schedule::{
    display_date, display_time, end_after, event_timestamp, listing_stamp, parse_start,
    StartParse,
};
use huddle_core::slots::{SlotFillingEngine, SlotPrompt, SlotStep};
use huddle_db::{CalendarError, CalendarStore};

use crate::fanout::{FanoutReport, MirrorMove, NotificationFanout};
use crate::network::Network;
use crate::tasks::{TaskCommand, TaskOutcome, ASSIGN_USAGE, DEFAULT_DUE_TIME};
use crate::understanding::{EntityExtractor, MeetingDetails};

const DEFAULT_RESCHEDULE_TIME: &str = "10:00";
const DEFAULT_TASK_PROJECT: &str = "general";
const UNPARSABLE_NOTICE: &str = "I couldn't understand the date/time format. Please provide the date in YYYY-MM-DD format and time in HH:MM format.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulingSettings {
    pub default_duration_minutes: u32,
    pub list_max_results: u32,
    pub reschedule_lookahead: u32,
    pub cancel_lookahead: u32,
    pub allowed_roles: Vec<String>,
    pub timezone: String,
    pub attendee_domain: String,
}

impl SchedulingSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_duration_minutes: config.scheduling.default_duration_minutes,
            list_max_results: config.scheduling.list_max_results,
            reschedule_lookahead: config.scheduling.reschedule_lookahead,
            cancel_lookahead: config.scheduling.cancel_lookahead,
            allowed_roles: config.scheduling.allowed_roles.clone(),
            timezone: config.calendar.timezone.clone(),
            attendee_domain: config.calendar.attendee_domain.clone(),
        }
    }

    fn is_allowed_role(&self, role: &str) -> bool {
        self.allowed_roles.iter().any(|allowed| allowed == role)
    }
}

impl Default for SchedulingSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulingFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// A temporal validation failure turned into a fresh date/time dialogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryRequest {
    pub kind: FailureKind,
    pub notice: String,
    pub context: MeetingContext,
    pub prompt: SlotPrompt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingSource {
    Calendar,
    Mirror,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulingOutcome {
    Created {
        meeting_id: String,
        event_id: Option<String>,
        title: String,
        start: NaiveDateTime,
        participants: Vec<AgentId>,
        fanout: FanoutReport,
    },
    Rescheduled {
        key: String,
        title: String,
        start: NaiveDateTime,
        duration_minutes: i64,
        fanout: FanoutReport,
    },
    Cancelled {
        titles: Vec<String>,
    },
    Listed {
        source: ListingSource,
        lines: Vec<String>,
    },
    RetryRequested(RetryRequest),
    Failed(SchedulingFailure),
}

impl SchedulingOutcome {
    pub fn cancelled_count(&self) -> usize {
        match self {
            Self::Cancelled { titles } => titles.len(),
            _ => 0,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed(failure) => Some(failure.kind),
            Self::RetryRequested(retry) => Some(retry.kind),
            _ => None,
        }
    }

    /// User-facing status lines.
    pub fn render(&self) -> Vec<String> {
        match self {
            Self::Created { event_id, title, start, participants, .. } => {
                let with = participants.iter().map(AgentId::as_str).collect::<Vec<_>>().join(", ");
                let when = format!("{} at {}", start.format("%Y-%m-%d"), start.format("%H:%M"));
                if event_id.is_some() {
                    vec![format!("Meeting '{title}' scheduled for {when} with {with}.")]
                } else {
                    vec![format!(
                        "Meeting '{title}' scheduled locally for {when} with {with} (calendar unavailable)."
                    )]
                }
            }
            Self::Rescheduled { title, start, .. } => vec![format!(
                "Meeting '{title}' has been rescheduled to {} at {}.",
                display_date(*start),
                display_time(*start)
            )],
            Self::Cancelled { titles } if titles.is_empty() => {
                vec!["No meetings found matching the cancellation criteria.".to_string()]
            }
            Self::Cancelled { titles } => {
                let mut lines: Vec<String> =
                    titles.iter().map(|title| format!("Cancelled meeting: {title}")).collect();
                lines.push(format!("Cancelled {} meeting(s).", titles.len()));
                lines
            }
            Self::Listed { source, lines } if lines.is_empty() => vec![match source {
                ListingSource::Calendar => "No upcoming meetings found.".to_string(),
                ListingSource::Mirror => "No meetings scheduled.".to_string(),
            }],
            Self::Listed { lines, .. } => {
                let mut rendered = vec!["Upcoming meetings:".to_string()];
                rendered.extend(lines.iter().cloned());
                rendered
            }
            Self::RetryRequested(retry) => vec![retry.notice.clone(), retry.prompt.text.clone()],
            Self::Failed(failure) => vec![failure.message.clone()],
        }
    }
}

/// A reschedule target from either source of truth.
#[derive(Clone, Debug)]
enum Target {
    Event(CalendarEvent),
    Local(MirrorEntry),
}

impl Target {
    fn key(&self) -> String {
        match self {
            Self::Event(event) => event.id.clone(),
            Self::Local(entry) => entry.key().to_string(),
        }
    }

    fn title(&self) -> &str {
        match self {
            Self::Event(event) => &event.summary,
            Self::Local(entry) => &entry.title,
        }
    }

    fn participants(&self) -> Vec<String> {
        match self {
            Self::Event(event) => event.attendee_local_parts(),
            Self::Local(entry) => {
                entry.participants.iter().map(|agent| agent.as_str().to_string()).collect()
            }
        }
    }

    fn duration_minutes(&self) -> Option<i64> {
        match self {
            Self::Event(event) => event.duration_minutes(),
            Self::Local(entry) => match (entry.start, entry.end) {
                (Some(start), Some(end)) => Some((end - start).num_minutes()),
                _ => None,
            },
        }
    }
}

pub struct SchedulingOrchestrator {
    network: Arc<Network>,
    calendar: Option<Arc<dyn CalendarStore>>,
    extractor: Arc<dyn EntityExtractor>,
    clock: Arc<dyn Clock>,
    settings: SchedulingSettings,
    fanout: NotificationFanout,
    audit: Arc<dyn AuditSink>,
    matcher: EventMatcher,
    engine: SlotFillingEngine,
}

impl SchedulingOrchestrator {
    /// `calendar = None` runs in local-only mode: every meeting lives in the
    /// participants' mirrors.
    pub fn new(
        network: Arc<Network>,
        calendar: Option<Arc<dyn CalendarStore>>,
        extractor: Arc<dyn EntityExtractor>,
        clock: Arc<dyn Clock>,
        settings: SchedulingSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            fanout: NotificationFanout::new(network.clone()),
            network,
            calendar,
            extractor,
            clock,
            settings,
            audit,
            matcher: EventMatcher,
            engine: SlotFillingEngine::new(),
        }
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// Extract meeting details from `text` and create the meeting.
    pub async fn schedule_from_text(
        &self,
        initiator: &AgentId,
        text: &str,
        audit: &AuditContext,
    ) -> SchedulingOutcome {
        match self.extractor.extract_meeting_details(text).await {
            Ok(details) => self.create_meeting(initiator, details, text, audit).await,
            Err(error) => {
                warn!(event_name = "meeting.request_rejected", agent_id = %initiator, error = %error, "meeting details could not be extracted");
                self.fail(
                    initiator,
                    audit,
                    FailureKind::Extraction,
                    "I couldn't understand the meeting details. Please try again.",
                )
            }
        }
    }

    pub async fn create_meeting(
        &self,
        initiator: &AgentId,
        details: MeetingDetails,
        initial_message: &str,
        audit: &AuditContext,
    ) -> SchedulingOutcome {
        let mut requested: Vec<String> = Vec::new();
        for role in &details.participants {
            let role = role.trim().to_ascii_lowercase();
            if self.settings.is_allowed_role(&role) && !requested.contains(&role) {
                requested.push(role);
            }
        }
        if requested.is_empty() {
            return self.fail(
                initiator,
                audit,
                FailureKind::NoValidParticipants,
                format!(
                    "No valid participants found for the meeting. Allowed participants: {}.",
                    self.settings.allowed_roles.join(", ")
                ),
            );
        }

        let title = match details.title.trim() {
            "" => format!("Meeting scheduled by {initiator}"),
            title => title.to_string(),
        };
        let now = self.clock.now();
        let date = match details.date.trim() {
            "" => now.format("%Y-%m-%d").to_string(),
            date => date.to_string(),
        };
        let time = details.time.trim().to_string();

        let preserved = || {
            BTreeMap::from([
                (SlotName::Title, title.clone()),
                (SlotName::Participants, requested.join(", ")),
            ])
        };
        let start = match parse_start(&date, &time, now) {
            StartParse::Valid(start) => start,
            rejected => {
                let (kind, notice) = match rejected {
                    StartParse::Past(_) => (
                        FailureKind::PastDateTime,
                        format!(
                            "The meeting time {date} at {time} is in the past. Please provide a future date and time."
                        ),
                    ),
                    _ => (FailureKind::UnparsableDateTime, UNPARSABLE_NOTICE.to_string()),
                };
                return self.retry(initiator, audit, kind, notice, initial_message, preserved(), None);
            }
        };

        let mut participants: Vec<AgentId> = requested.iter().map(AgentId::new).collect();
        if !participants.contains(initiator) {
            participants.push(initiator.clone());
        }

        let duration = details
            .duration
            .filter(|minutes| *minutes > 0)
            .unwrap_or(self.settings.default_duration_minutes);
        let end = end_after(start, i64::from(duration));

        if let Some((busy, clash)) = self.find_conflict(&participants, start, end) {
            warn!(
                event_name = "meeting.conflict_detected",
                agent_id = %initiator,
                correlation_id = %audit.correlation_id,
                participant = %busy,
                clashing_key = %clash.key(),
                "proposed slot overlaps an existing meeting"
            );
            let notice = match (clash.start, clash.end) {
                (Some(clash_start), Some(clash_end)) => format!(
                    "Conflict found for {busy}: '{}' already runs from {} to {} on {}. Please provide another date and time.",
                    clash.title,
                    clash_start.format("%H:%M"),
                    clash_end.format("%H:%M"),
                    clash_start.format("%Y-%m-%d")
                ),
                _ => format!("Conflict found for {busy}. Please provide another date and time."),
            };
            return self.retry(
                initiator,
                audit,
                FailureKind::SchedulingConflict,
                notice,
                initial_message,
                preserved(),
                None,
            );
        }

        let event_id = match &self.calendar {
            Some(calendar) => {
                let event = NewEvent {
                    summary: title.clone(),
                    description: Some(initial_message.trim().to_string()),
                    start: EventTime::new(event_timestamp(start), &self.settings.timezone),
                    end: EventTime::new(event_timestamp(end), &self.settings.timezone),
                    attendees: participants
                        .iter()
                        .map(|agent| Attendee::for_agent(agent, &self.settings.attendee_domain))
                        .collect(),
                    reminders: Vec::new(),
                };
                match calendar.create_event(event).await {
                    Ok(created) => Some(created.id),
                    Err(error) => {
                        self.calendar_unavailable(initiator, "create_event", &error);
                        None
                    }
                }
            }
            None => None,
        };

        let entry = MirrorEntry {
            meeting_id: Uuid::new_v4().to_string(),
            event_id: event_id.clone(),
            title: title.clone(),
            summary_text: format!("{title} on {}", listing_stamp(start)),
            start: Some(start),
            end: Some(end),
            participants: participants.clone(),
        };
        self.network.append_mirror(initiator, entry.clone());

        let text = format!(
            "New meeting: '{title}' scheduled by {initiator} for {} at {}",
            start.format("%Y-%m-%d"),
            start.format("%H:%M")
        );
        let fanout = self.fanout.meeting_created(initiator, &entry, &text);

        let event_name = if event_id.is_some() { "meeting.created" } else { "meeting.created_local" };
        info!(
            event_name,
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            meeting_id = %entry.meeting_id,
            event_id = event_id.as_deref().unwrap_or("local"),
            participants = participants.len(),
            "meeting created"
        );
        self.audit.record(
            audit
                .record(event_name, AuditCategory::Calendar, AuditOutcome::Success)
                .detail("meeting_id", entry.meeting_id.clone())
                .detail("event_id", event_id.clone().unwrap_or_default())
                .detail("title", title.clone()),
        );

        SchedulingOutcome::Created {
            meeting_id: entry.meeting_id,
            event_id,
            title,
            start,
            participants,
            fanout,
        }
    }

    pub async fn reschedule_meeting(
        &self,
        initiator: &AgentId,
        text: &str,
        audit: &AuditContext,
    ) -> SchedulingOutcome {
        let details = match self.extractor.extract_rescheduling_details(text).await {
            Ok(details) => details,
            Err(error) => {
                warn!(event_name = "meeting.request_rejected", agent_id = %initiator, error = %error, "rescheduling details could not be extracted");
                return self.fail(
                    initiator,
                    audit,
                    FailureKind::Extraction,
                    "I couldn't understand the rescheduling request. Please try again.",
                );
            }
        };

        let identifier = details.meeting_identifier.trim();
        if identifier.is_empty() {
            return self.fail(
                initiator,
                audit,
                FailureKind::MissingDetails,
                "Could not determine which meeting to reschedule",
            );
        }
        let new_date = details.new_date.trim();
        if new_date.is_empty() {
            return self.fail(
                initiator,
                audit,
                FailureKind::MissingDetails,
                "No new date specified for rescheduling",
            );
        }
        let new_time = match details.new_time.trim() {
            "" => DEFAULT_RESCHEDULE_TIME,
            time => time,
        };

        let now = self.clock.now();
        let query = MatchQuery::new(identifier, details.original_date.as_deref());
        let target = match &self.calendar {
            Some(calendar) => {
                let events =
                    match calendar.list_upcoming(self.settings.reschedule_lookahead, now).await {
                        Ok(events) => events,
                        Err(error) => return self.unavailable(initiator, audit, "list_upcoming", &error),
                    };
                if events.is_empty() {
                    return self.fail(
                        initiator,
                        audit,
                        FailureKind::NoUpcomingMeetings,
                        "No upcoming meetings found to reschedule",
                    );
                }
                match self.matcher.best_match(&query, &events) {
                    Some(found) => Target::Event(found.candidate.clone()),
                    None => return self.no_match(initiator, audit, identifier),
                }
            }
            None => {
                let entries = self.upcoming_mirror(initiator);
                if entries.is_empty() {
                    return self.fail(
                        initiator,
                        audit,
                        FailureKind::NoUpcomingMeetings,
                        "No upcoming meetings found to reschedule",
                    );
                }
                match self.matcher.best_match(&query, &entries) {
                    Some(found) => Target::Local(found.candidate.clone()),
                    None => return self.no_match(initiator, audit, identifier),
                }
            }
        };

        self.validate_and_apply(initiator, audit, text, target, new_date, new_time, details.new_duration)
            .await
    }

    /// Finish a reschedule whose date and time were collected by the slot
    /// dialogue.
    pub async fn complete_reschedule(
        &self,
        initiator: &AgentId,
        initial_message: &str,
        target_event_id: &str,
        collected: &BTreeMap<SlotName, String>,
        audit: &AuditContext,
    ) -> SchedulingOutcome {
        let target = match &self.calendar {
            Some(calendar) => match calendar.get_event(target_event_id).await {
                Ok(Some(event)) => Target::Event(event),
                Ok(None) => return self.no_match(initiator, audit, target_event_id),
                Err(error) => return self.unavailable(initiator, audit, "get_event", &error),
            },
            None => match self
                .upcoming_mirror(initiator)
                .into_iter()
                .find(|entry| entry.key() == target_event_id)
            {
                Some(entry) => Target::Local(entry),
                None => return self.no_match(initiator, audit, target_event_id),
            },
        };

        let date = collected.get(&SlotName::Date).map(String::as_str).unwrap_or_default();
        let time = collected.get(&SlotName::Time).map(String::as_str).unwrap_or_default();
        self.validate_and_apply(initiator, audit, initial_message, target, date, time, None).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn validate_and_apply(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        initial_message: &str,
        target: Target,
        date: &str,
        time: &str,
        new_duration: Option<u32>,
    ) -> SchedulingOutcome {
        match parse_start(date, time, self.clock.now()) {
            StartParse::Valid(start) => {
                self.apply_reschedule(initiator, audit, target, start, new_duration).await
            }
            rejected => {
                let (kind, notice) = match rejected {
                    StartParse::Past(_) => (
                        FailureKind::PastDateTime,
                        format!(
                            "The rescheduled time {} at {} is in the past. Please provide a future date and time.",
                            date.trim(),
                            time.trim()
                        ),
                    ),
                    _ => (FailureKind::UnparsableDateTime, UNPARSABLE_NOTICE.to_string()),
                };
                let preserved = BTreeMap::from([(SlotName::Title, target.title().to_string())]);
                self.retry(initiator, audit, kind, notice, initial_message, preserved, Some(target.key()))
            }
        }
    }

    async fn apply_reschedule(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        target: Target,
        start: NaiveDateTime,
        new_duration: Option<u32>,
    ) -> SchedulingOutcome {
        let duration = new_duration
            .filter(|minutes| *minutes > 0)
            .map(i64::from)
            .or_else(|| target.duration_minutes().filter(|minutes| *minutes > 0))
            .unwrap_or(i64::from(self.settings.default_duration_minutes));
        let end = end_after(start, duration);
        let key = target.key();
        let title = target.title().to_string();
        let participants = target.participants();

        if let Target::Event(mut event) = target {
            let Some(calendar) = &self.calendar else {
                return self.fail(
                    initiator,
                    audit,
                    FailureKind::CalendarUnavailable,
                    "There was an error rescheduling the meeting. Please try again.",
                );
            };
            event.start = EventTime::new(event_timestamp(start), event.start.time_zone.clone());
            event.end = EventTime::new(event_timestamp(end), event.end.time_zone.clone());
            if let Err(error) = calendar.update_event(event).await {
                self.calendar_unavailable(initiator, "update_event", &error);
                return self.fail(
                    initiator,
                    audit,
                    FailureKind::CalendarUnavailable,
                    "There was an error rescheduling the meeting. Please try again.",
                );
            }
        }

        let moved = MirrorMove {
            start,
            end,
            summary_text: format!(
                "{title} (Rescheduled to {} at {})",
                display_date(start),
                display_time(start)
            ),
        };
        self.network.update_mirror(initiator, &key, |entry| {
            entry.start = Some(moved.start);
            entry.end = Some(moved.end);
            entry.summary_text = moved.summary_text.clone();
        });

        let text = format!(
            "Your meeting '{title}' has been rescheduled by {initiator}. New date: {}. New time: {}. Duration: {duration} minutes",
            display_date(start),
            display_time(start)
        );
        let fanout = self.fanout.meeting_rescheduled(initiator, &key, &participants, &moved, &text);

        info!(
            event_name = "meeting.rescheduled",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            key = %key,
            start = %event_timestamp(start),
            duration_minutes = duration,
            "meeting rescheduled"
        );
        self.audit.record(
            audit
                .record("meeting.rescheduled", AuditCategory::Calendar, AuditOutcome::Success)
                .detail("key", key.clone())
                .detail("start", event_timestamp(start)),
        );

        SchedulingOutcome::Rescheduled { key, title, start, duration_minutes: duration, fanout }
    }

    pub async fn cancel_meeting(
        &self,
        initiator: &AgentId,
        text: &str,
        audit: &AuditContext,
    ) -> SchedulingOutcome {
        let details = match self.extractor.extract_cancellation_details(text).await {
            Ok(details) => details,
            Err(error) => {
                warn!(event_name = "meeting.request_rejected", agent_id = %initiator, error = %error, "cancellation details could not be extracted");
                return self.fail(
                    initiator,
                    audit,
                    FailureKind::Extraction,
                    "I couldn't understand which meeting to cancel. Please try again.",
                );
            }
        };
        let criteria = CancellationCriteria::new(
            details.title.as_deref(),
            &details.with_participants,
            details.date.as_deref(),
        );

        let mut titles = Vec::new();
        match &self.calendar {
            Some(calendar) => {
                let events = match calendar.list_upcoming(self.settings.cancel_lookahead, self.clock.now()).await {
                    Ok(events) => events,
                    Err(error) => return self.unavailable(initiator, audit, "list_upcoming", &error),
                };
                if events.is_empty() {
                    return self.fail(
                        initiator,
                        audit,
                        FailureKind::NoUpcomingMeetings,
                        "No upcoming meetings found to cancel",
                    );
                }

                for event in events.iter().filter(|event| criteria.matches(*event)) {
                    if let Err(error) = calendar.delete_event(&event.id).await {
                        warn!(
                            event_name = "calendar.unavailable",
                            agent_id = %initiator,
                            operation = "delete_event",
                            event_id = %event.id,
                            error = %error,
                            "meeting could not be cancelled, skipping"
                        );
                        continue;
                    }
                    self.network.remove_mirror(initiator, &event.id);
                    self.announce_cancelled(initiator, audit, &event.id, &event.summary, &event.attendee_local_parts());
                    titles.push(event.summary.clone());
                }
            }
            None => {
                let entries = self.upcoming_mirror(initiator);
                if entries.is_empty() {
                    return self.fail(
                        initiator,
                        audit,
                        FailureKind::NoUpcomingMeetings,
                        "No upcoming meetings found to cancel",
                    );
                }

                for entry in entries.iter().filter(|entry| criteria.matches(*entry)) {
                    let participants: Vec<String> =
                        entry.participants.iter().map(|agent| agent.as_str().to_string()).collect();
                    self.network.remove_mirror(initiator, entry.key());
                    self.announce_cancelled(initiator, audit, entry.key(), &entry.title, &participants);
                    titles.push(entry.title.clone());
                }
            }
        }

        SchedulingOutcome::Cancelled { titles }
    }

    fn announce_cancelled(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        key: &str,
        title: &str,
        participants: &[String],
    ) {
        let text = format!("Meeting '{title}' has been cancelled by {initiator}");
        self.fanout.meeting_cancelled(initiator, key, participants, &text);

        info!(
            event_name = "meeting.cancelled",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            key = %key,
            "meeting cancelled"
        );
        self.audit.record(
            audit
                .record("meeting.cancelled", AuditCategory::Calendar, AuditOutcome::Success)
                .detail("key", key)
                .detail("title", title),
        );
    }

    /// Read-only. Falls back to the caller's mirror when the calendar
    /// cannot be read.
    pub async fn list_meetings(&self, initiator: &AgentId) -> SchedulingOutcome {
        let Some(calendar) = &self.calendar else {
            return self.list_mirror(initiator);
        };

        match calendar.list_upcoming(self.settings.list_max_results, self.clock.now()).await {
            Ok(events) => SchedulingOutcome::Listed {
                source: ListingSource::Calendar,
                lines: events
                    .iter()
                    .map(|event| {
                        let when = event
                            .start
                            .naive()
                            .map(listing_stamp)
                            .unwrap_or_else(|| event.start.date_time.clone());
                        format!(
                            "  - {} on {when} with {}",
                            event.summary,
                            event.attendee_local_parts().join(", ")
                        )
                    })
                    .collect(),
            },
            Err(error) => {
                self.calendar_unavailable(initiator, "list_upcoming", &error);
                self.list_mirror(initiator)
            }
        }
    }

    fn list_mirror(&self, initiator: &AgentId) -> SchedulingOutcome {
        SchedulingOutcome::Listed {
            source: ListingSource::Mirror,
            lines: self
                .upcoming_mirror(initiator)
                .into_iter()
                .take(self.settings.list_max_results as usize)
                .map(|entry| format!("  - {}", entry.summary_text))
                .collect(),
        }
    }

    /// The caller's mirror without meetings that already started, in start
    /// order.
    fn upcoming_mirror(&self, agent: &AgentId) -> Vec<MirrorEntry> {
        let now = self.clock.now();
        let mut entries: Vec<MirrorEntry> =
            self.network.mirror(agent).into_iter().filter(|entry| entry.is_upcoming(now)).collect();
        entries.sort_by_key(|entry| entry.start);
        entries
    }

    /// First participant already booked during `[start, end)`, with the
    /// meeting that blocks them.
    fn find_conflict(
        &self,
        participants: &[AgentId],
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Option<(AgentId, MirrorEntry)> {
        participants.iter().find_map(|agent| {
            self.network
                .mirror(agent)
                .into_iter()
                .find(|entry| entry.overlaps(start, end))
                .map(|entry| (agent.clone(), entry))
        })
    }

    /// Answer a task quick command for `initiator`.
    pub async fn handle_task_command(
        &self,
        initiator: &AgentId,
        command: TaskCommand,
        audit: &AuditContext,
    ) -> TaskOutcome {
        match command {
            TaskCommand::List => TaskOutcome::Listed { tasks: self.network.tasks_for(initiator) },
            TaskCommand::Complete { task_id } => {
                let id = TaskId(task_id);
                let Some(task) =
                    self.network.tasks_for(initiator).into_iter().find(|task| task.id == id)
                else {
                    return TaskOutcome::NotFound { task_id: id.0 };
                };
                self.network.complete_task(&id);
                info!(
                    event_name = "task.completed",
                    agent_id = %initiator,
                    correlation_id = %audit.correlation_id,
                    task_id = %id.0,
                    "task completed"
                );
                self.audit.record(
                    audit
                        .record("task.completed", AuditCategory::Task, AuditOutcome::Success)
                        .detail("task_id", id.0.clone()),
                );
                TaskOutcome::Completed { title: task.title }
            }
            TaskCommand::Assign { assignee, due_date, due_time, title } => {
                self.assign_task(initiator, assignee, due_date, due_time, title, audit).await
            }
            TaskCommand::Invalid { usage } => TaskOutcome::Usage(usage),
        }
    }

    async fn assign_task(
        &self,
        initiator: &AgentId,
        assignee: String,
        due_date: String,
        due_time: Option<String>,
        title: String,
        audit: &AuditContext,
    ) -> TaskOutcome {
        let assignee = AgentId::new(assignee);
        if !self.network.is_registered(&assignee) {
            let known =
                self.network.agent_ids().iter().map(AgentId::as_str).collect::<Vec<_>>().join(", ");
            return TaskOutcome::Rejected {
                message: format!("Unknown agent '{assignee}'. Known agents: {known}."),
            };
        }

        let due_time = due_time.unwrap_or_else(|| DEFAULT_DUE_TIME.to_string());
        let due = match parse_start(&due_date, &due_time, self.clock.now()) {
            StartParse::Valid(due) => due,
            StartParse::Past(_) => {
                return TaskOutcome::Rejected {
                    message: format!(
                        "The due date {due_date} at {due_time} is in the past. Please provide a future date."
                    ),
                }
            }
            StartParse::Unparsable => return TaskOutcome::Usage(ASSIGN_USAGE),
        };

        let id = Uuid::new_v4().simple().to_string();
        let task = Task::new(
            format!("task-{}", &id[..8]),
            title,
            format!("Assigned by {initiator}"),
            due,
            assignee,
            TaskPriority::Medium,
            DEFAULT_TASK_PROJECT,
        );
        self.network.add_task(task.clone());
        let reminder_event_id = self.create_task_reminder(&task).await;

        info!(
            event_name = "task.assigned",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            task_id = %task.id.0,
            assignee = %task.assigned_to,
            "task assigned"
        );
        self.audit.record(
            audit
                .record("task.assigned", AuditCategory::Task, AuditOutcome::Success)
                .detail("task_id", task.id.0.clone())
                .detail("assignee", task.assigned_to.to_string())
                .detail("reminder_event_id", reminder_event_id.clone().unwrap_or_default()),
        );

        TaskOutcome::Assigned { task, reminder_event_id }
    }

    /// Calendar reminder for a task due date. Returns the event id, or
    /// `None` when the reminder was skipped.
    pub async fn create_task_reminder(&self, task: &Task) -> Option<String> {
        let Some(calendar) = &self.calendar else {
            info!(
                event_name = "task.reminder_skipped",
                task_id = %task.id.0,
                reason = "calendar not configured",
                "task reminder skipped"
            );
            return None;
        };

        let event = NewEvent {
            summary: format!("TASK: {}", task.title),
            description: Some(format!(
                "{}\n\nPriority: {}\nProject: {}",
                task.description, task.priority, task.project_id
            )),
            start: EventTime::new(event_timestamp(task.due_date), &self.settings.timezone),
            end: EventTime::new(
                event_timestamp(task.due_date + Duration::hours(1)),
                &self.settings.timezone,
            ),
            attendees: vec![Attendee::for_agent(&task.assigned_to, &self.settings.attendee_domain)],
            reminders: vec![
                Reminder { method: ReminderMethod::Email, minutes: 24 * 60 },
                Reminder { method: ReminderMethod::Popup, minutes: 60 },
            ],
        };

        match calendar.create_event(event).await {
            Ok(created) => {
                info!(
                    event_name = "task.reminder_created",
                    task_id = %task.id.0,
                    event_id = %created.id,
                    "task reminder created"
                );
                Some(created.id)
            }
            Err(error) => {
                warn!(
                    event_name = "task.reminder_skipped",
                    task_id = %task.id.0,
                    error = %error,
                    "task reminder could not be created"
                );
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn retry(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        kind: FailureKind,
        notice: String,
        initial_message: &str,
        preserved: BTreeMap<SlotName, String>,
        target_event_id: Option<String>,
    ) -> SchedulingOutcome {
        let mut context = MeetingContext::rearmed(initial_message, preserved, target_event_id);
        let prompt = match self.engine.rearm(&mut context) {
            SlotStep::Prompt(prompt) => prompt,
            SlotStep::Complete(_) => {
                return self.fail(initiator, audit, kind, notice);
            }
        };

        info!(
            event_name = "meeting.retry_requested",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            reason = kind.code(),
            rescheduling = context.is_rescheduling,
            "date and time requested again"
        );
        self.audit.record(
            audit
                .record("meeting.retry_requested", AuditCategory::Slot, AuditOutcome::Rejected)
                .because(kind)
                .detail("target", context.target_event_id.clone().unwrap_or_default()),
        );

        SchedulingOutcome::RetryRequested(RetryRequest { kind, notice, context, prompt })
    }

    fn fail(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> SchedulingOutcome {
        let message = message.into();
        info!(
            event_name = "meeting.request_rejected",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            reason = kind.code(),
            message = %message,
            "scheduling request not completed"
        );
        self.audit.record(
            audit
                .record("meeting.request_rejected", AuditCategory::Calendar, AuditOutcome::Failed)
                .because(kind),
        );
        SchedulingOutcome::Failed(SchedulingFailure { kind, message })
    }

    fn no_match(&self, initiator: &AgentId, audit: &AuditContext, identifier: &str) -> SchedulingOutcome {
        info!(
            event_name = "meeting.match_failed",
            agent_id = %initiator,
            correlation_id = %audit.correlation_id,
            identifier = %identifier,
            "no meeting matched the reference"
        );
        self.fail(
            initiator,
            audit,
            FailureKind::NoMatchFound,
            format!("No matching meeting found for '{identifier}'"),
        )
    }

    fn unavailable(
        &self,
        initiator: &AgentId,
        audit: &AuditContext,
        operation: &'static str,
        error: &CalendarError,
    ) -> SchedulingOutcome {
        self.calendar_unavailable(initiator, operation, error);
        self.fail(
            initiator,
            audit,
            FailureKind::CalendarUnavailable,
            "The calendar is unavailable right now. Please try again later.",
        )
    }

    fn calendar_unavailable(&self, initiator: &AgentId, operation: &'static str, error: &CalendarError) {
        warn!(
            event_name = "calendar.unavailable",
            agent_id = %initiator,
            operation,
            error = %error,
            "calendar call failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use huddle_core::domain::agent::AgentId;
    use huddle_core::errors::FailureKind;

    use super::{ListingSource, SchedulingFailure, SchedulingOutcome};
    use crate::fanout::FanoutReport;

    fn at(hour: u32, minute: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 9)
            .and_then(|date| date.and_hms_opt(hour, minute, 0))
            .expect("valid timestamp")
    }

    #[test]
    fn created_lines_distinguish_local_only_meetings() {
        let created = SchedulingOutcome::Created {
            meeting_id: "m-1".to_string(),
            event_id: Some("evt-1".to_string()),
            title: "Sync".to_string(),
            start: at(14, 30),
            participants: vec![AgentId::new("marketing"), AgentId::new("ceo")],
            fanout: FanoutReport::default(),
        };
        assert_eq!(
            created.render(),
            vec!["Meeting 'Sync' scheduled for 2026-03-09 at 14:30 with marketing, ceo.".to_string()]
        );

        let local = match created {
            SchedulingOutcome::Created { meeting_id, title, start, participants, fanout, .. } => {
                SchedulingOutcome::Created { meeting_id, event_id: None, title, start, participants, fanout }
            }
            other => other,
        };
        assert!(local.render()[0].contains("scheduled locally"));
    }

    #[test]
    fn rescheduled_line_uses_long_date_and_twelve_hour_time() {
        let outcome = SchedulingOutcome::Rescheduled {
            key: "evt-1".to_string(),
            title: "Budget Review".to_string(),
            start: at(15, 0),
            duration_minutes: 60,
            fanout: FanoutReport::default(),
        };
        assert_eq!(
            outcome.render(),
            vec!["Meeting 'Budget Review' has been rescheduled to March 09, 2026 at 03:00 PM."
                .to_string()]
        );
    }

    #[test]
    fn zero_cancellations_are_reported_distinctly() {
        let none = SchedulingOutcome::Cancelled { titles: Vec::new() };
        assert_eq!(none.cancelled_count(), 0);
        assert_eq!(
            none.render(),
            vec!["No meetings found matching the cancellation criteria.".to_string()]
        );

        let two = SchedulingOutcome::Cancelled { titles: vec!["A".to_string(), "B".to_string()] };
        assert_eq!(two.cancelled_count(), 2);
        assert_eq!(two.render().last().map(String::as_str), Some("Cancelled 2 meeting(s)."));
    }

    #[test]
    fn empty_listings_name_their_source() {
        let calendar = SchedulingOutcome::Listed { source: ListingSource::Calendar, lines: Vec::new() };
        let mirror = SchedulingOutcome::Listed { source: ListingSource::Mirror, lines: Vec::new() };
        assert_eq!(calendar.render(), vec!["No upcoming meetings found.".to_string()]);
        assert_eq!(mirror.render(), vec!["No meetings scheduled.".to_string()]);

        let listed = SchedulingOutcome::Listed {
            source: ListingSource::Calendar,
            lines: vec!["  - Sync on 2026-03-09 at 14:30 with ceo".to_string()],
        };
        assert_eq!(listed.render()[0], "Upcoming meetings:");
    }

    #[test]
    fn failures_render_their_message_and_expose_the_kind() {
        let failed = SchedulingOutcome::Failed(SchedulingFailure {
            kind: FailureKind::NoMatchFound,
            message: "No matching meeting found for 'budget'".to_string(),
        });
        assert_eq!(failed.failure_kind(), Some(FailureKind::NoMatchFound));
        assert_eq!(failed.render(), vec!["No matching meeting found for 'budget'".to_string()]);
    }
}
