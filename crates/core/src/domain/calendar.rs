use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTime {
    /// ISO-8601 timestamp exactly as the calendar store returned it.
    pub date_time: String,
    pub time_zone: String,
}

impl EventTime {
    pub fn new(date_time: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self { date_time: date_time.into(), time_zone: time_zone.into() }
    }

    /// Wall-clock reading of the timestamp. Offsets and `Z` suffixes are
    /// accepted and dropped.
    pub fn naive(&self) -> Option<NaiveDateTime> {
        let raw = self.date_time.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.naive_local());
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
            .ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub email: String,
}

impl Attendee {
    pub fn new(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }

    pub fn for_agent(agent: &AgentId, domain: &str) -> Self {
        Self { email: format!("{}@{domain}", agent.as_str()) }
    }

    /// Lower-cased part of the address before `@`.
    pub fn local_part(&self) -> String {
        self.email.split('@').next().unwrap_or_default().trim().to_ascii_lowercase()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMethod {
    Email,
    Popup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub method: ReminderMethod,
    pub minutes: u32,
}

/// An event as held by the calendar store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    pub reminders: Vec<Reminder>,
}

impl CalendarEvent {
    pub fn attendee_local_parts(&self) -> Vec<String> {
        self.attendees.iter().map(Attendee::local_part).collect()
    }

    pub fn duration_minutes(&self) -> Option<i64> {
        let start = self.start.naive()?;
        let end = self.end.naive()?;
        Some((end - start).num_minutes())
    }
}

/// Event body submitted to the store; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub summary: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    pub attendees: Vec<Attendee>,
    pub reminders: Vec<Reminder>,
}

impl NewEvent {
    pub fn into_event(self, id: impl Into<String>) -> CalendarEvent {
        CalendarEvent {
            id: id.into(),
            summary: self.summary,
            description: self.description,
            start: self.start,
            end: self.end,
            attendees: self.attendees,
            reminders: self.reminders,
        }
    }
}

/// Agent-local cached view of a meeting. `event_id` is `None` for meetings
/// that only exist locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub meeting_id: String,
    pub event_id: Option<String>,
    pub title: String,
    pub summary_text: String,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub participants: Vec<AgentId>,
}

impl MirrorEntry {
    /// Key shared by every participant's copy of the same meeting.
    pub fn key(&self) -> &str {
        self.event_id.as_deref().unwrap_or(&self.meeting_id)
    }

    pub fn is_local_only(&self) -> bool {
        self.event_id.is_none()
    }

    /// Entries without a recorded start are kept; they cannot be placed.
    pub fn is_upcoming(&self, now: NaiveDateTime) -> bool {
        self.start.map_or(true, |start| start >= now)
    }

    /// Whether `[start, end)` shares any time with this entry. Back-to-back
    /// meetings do not overlap.
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        match (self.start, self.end) {
            (Some(own_start), Some(own_end)) => start < own_end && end > own_start,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Attendee, CalendarEvent, EventTime, MirrorEntry};

    fn event(start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            id: "evt-1".to_string(),
            summary: "Standup".to_string(),
            description: None,
            start: EventTime::new(start, "UTC"),
            end: EventTime::new(end, "UTC"),
            attendees: vec![Attendee::new("Marketing@example.com"), Attendee::new("design")],
            reminders: Vec::new(),
        }
    }

    #[test]
    fn attendee_local_parts_are_lower_cased() {
        let event = event("2030-01-02T09:00:00", "2030-01-02T09:30:00");
        assert_eq!(event.attendee_local_parts(), vec!["marketing", "design"]);
    }

    #[test]
    fn duration_is_read_from_naive_and_offset_timestamps() {
        assert_eq!(event("2030-01-02T09:00:00", "2030-01-02T09:45:00").duration_minutes(), Some(45));
        assert_eq!(
            event("2030-01-02T09:00:00Z", "2030-01-02T11:00:00+00:00").duration_minutes(),
            Some(120)
        );
        assert_eq!(event("soon", "later").duration_minutes(), None);
    }

    #[test]
    fn offset_timestamps_keep_wall_clock_reading() {
        let time = EventTime::new("2030-01-02T09:00:00+02:00", "Europe/Berlin");
        let expected = NaiveDate::from_ymd_opt(2030, 1, 2).and_then(|d| d.and_hms_opt(9, 0, 0));
        assert_eq!(time.naive(), expected);
    }

    fn entry(start_hour: u32, end_hour: u32) -> MirrorEntry {
        let at = |hour| {
            NaiveDate::from_ymd_opt(2026, 3, 10).and_then(|date| date.and_hms_opt(hour, 0, 0))
        };
        MirrorEntry {
            meeting_id: "m-1".to_string(),
            event_id: None,
            title: "Offsite".to_string(),
            summary_text: "Offsite on 2026-03-10 at 10:00".to_string(),
            start: at(start_hour),
            end: at(end_hour),
            participants: Vec::new(),
        }
    }

    #[test]
    fn overlap_is_half_open() {
        let offsite = entry(10, 12);
        let at = |hour, minute| {
            NaiveDate::from_ymd_opt(2026, 3, 10)
                .and_then(|date| date.and_hms_opt(hour, minute, 0))
                .expect("valid timestamp")
        };

        assert!(offsite.overlaps(at(11, 0), at(11, 30)));
        assert!(offsite.overlaps(at(9, 30), at(10, 30)));
        assert!(offsite.overlaps(at(9, 0), at(13, 0)));
        assert!(!offsite.overlaps(at(12, 0), at(13, 0)));
        assert!(!offsite.overlaps(at(9, 0), at(10, 0)));

        assert!(offsite.is_upcoming(at(10, 0)));
        assert!(!offsite.is_upcoming(at(10, 1)));
    }
}
