//! Resolution of free-text meeting references against upcoming events.

use std::borrow::Cow;

use crate::domain::calendar::{CalendarEvent, MirrorEntry};
use crate::schedule::event_timestamp;

/// Lowest total score at which a candidate is accepted.
pub const MIN_ACCEPTED_SCORE: u32 = 1;

pub const SUMMARY_SUBSTRING_SCORE: u32 = 3;
pub const SUMMARY_TOKEN_SCORE: u32 = 1;
pub const ATTENDEE_SCORE: u32 = 2;
pub const ORIGINAL_DATE_SCORE: u32 = 4;

/// Anything that can be scored as a meeting reference target.
pub trait MatchCandidate {
    fn summary(&self) -> &str;
    fn attendee_local_parts(&self) -> Vec<String>;
    /// Start timestamp as stored, used for date substring checks.
    fn raw_start(&self) -> Cow<'_, str>;
}

impl MatchCandidate for CalendarEvent {
    fn summary(&self) -> &str {
        &self.summary
    }

    fn attendee_local_parts(&self) -> Vec<String> {
        CalendarEvent::attendee_local_parts(self)
    }

    fn raw_start(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.start.date_time)
    }
}

impl MatchCandidate for MirrorEntry {
    fn summary(&self) -> &str {
        &self.title
    }

    fn attendee_local_parts(&self) -> Vec<String> {
        self.participants.iter().map(|agent| agent.as_str().to_string()).collect()
    }

    fn raw_start(&self) -> Cow<'_, str> {
        match self.start {
            Some(start) => Cow::Owned(event_timestamp(start)),
            None => Cow::Borrowed(""),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchQuery {
    identifier: String,
    original_date: Option<String>,
}

impl MatchQuery {
    pub fn new(identifier: &str, original_date: Option<&str>) -> Self {
        Self {
            identifier: identifier.trim().to_lowercase(),
            original_date: original_date
                .map(str::trim)
                .filter(|date| !date.is_empty())
                .map(str::to_string),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ScoredMatch<'a, C> {
    pub index: usize,
    pub candidate: &'a C,
    pub score: u32,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EventMatcher;

impl EventMatcher {
    pub fn score<C: MatchCandidate>(&self, query: &MatchQuery, candidate: &C) -> u32 {
        let mut score = 0;
        let summary = candidate.summary().to_lowercase();

        if summary.contains(&query.identifier) {
            score += SUMMARY_SUBSTRING_SCORE;
        } else if query.identifier.split_whitespace().any(|token| summary.contains(token)) {
            score += SUMMARY_TOKEN_SCORE;
        }

        if candidate
            .attendee_local_parts()
            .iter()
            .any(|local_part| local_part.to_lowercase().contains(&query.identifier))
        {
            score += ATTENDEE_SCORE;
        }

        if let Some(original_date) = &query.original_date {
            if candidate.raw_start().contains(original_date.as_str()) {
                score += ORIGINAL_DATE_SCORE;
            }
        }

        score
    }

    /// Highest-scoring candidate. Ties keep the earlier candidate, so
    /// callers pass candidates in ascending start order.
    pub fn best_match<'a, C: MatchCandidate>(
        &self,
        query: &MatchQuery,
        candidates: &'a [C],
    ) -> Option<ScoredMatch<'a, C>> {
        let mut best: Option<ScoredMatch<'a, C>> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.score(query, candidate);
            let better = match &best {
                Some(current) => score > current.score,
                None => true,
            };
            if better {
                best = Some(ScoredMatch { index, candidate, score });
            }
        }

        best.filter(|found| found.score >= MIN_ACCEPTED_SCORE)
    }
}

/// Filter for bulk cancellation. Absent criteria do not restrict.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CancellationCriteria {
    pub title: Option<String>,
    pub participants: Vec<String>,
    pub date: Option<String>,
}

impl CancellationCriteria {
    pub fn new(title: Option<&str>, participants: &[String], date: Option<&str>) -> Self {
        let non_empty = |value: Option<&str>| {
            value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
        };

        Self {
            title: non_empty(title).map(|title| title.to_lowercase()),
            participants: participants
                .iter()
                .map(|participant| participant.trim().to_lowercase())
                .filter(|participant| !participant.is_empty())
                .collect(),
            date: non_empty(date),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.title.is_none() && self.participants.is_empty() && self.date.is_none()
    }

    pub fn matches<C: MatchCandidate>(&self, candidate: &C) -> bool {
        if let Some(title) = &self.title {
            if !candidate.summary().to_lowercase().contains(title.as_str()) {
                return false;
            }
        }

        if !self.participants.is_empty() {
            let attendees = candidate.attendee_local_parts();
            if !self.participants.iter().any(|participant| attendees.contains(participant)) {
                return false;
            }
        }

        if let Some(date) = &self.date {
            let start = candidate.raw_start();
            if !start.is_empty() && !start.contains(date.as_str()) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::calendar::{Attendee, CalendarEvent, EventTime};

    use super::{CancellationCriteria, EventMatcher, MatchQuery, ORIGINAL_DATE_SCORE};

    fn event(id: &str, summary: &str, attendees: &[&str], start: &str) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            summary: summary.to_string(),
            description: None,
            start: EventTime::new(start, "UTC"),
            end: EventTime::new(start, "UTC"),
            attendees: attendees
                .iter()
                .map(|agent| Attendee::new(format!("{agent}@example.com")))
                .collect(),
            reminders: Vec::new(),
        }
    }

    #[test]
    fn substring_title_match_scores_three() {
        let matcher = EventMatcher;
        let query = MatchQuery::new("Standup", None);
        let candidate = event("e1", "Daily Standup", &["ceo"], "2030-01-02T09:00:00");
        assert_eq!(matcher.score(&query, &candidate), 3);
    }

    #[test]
    fn token_match_only_counts_when_substring_fails() {
        let matcher = EventMatcher;
        let query = MatchQuery::new("sync retro", None);
        let partial = event("e1", "Sync with marketing", &[], "2030-01-02T09:00:00");
        let full = event("e2", "Sync Retro", &[], "2030-01-02T09:00:00");
        assert_eq!(matcher.score(&query, &partial), 1);
        assert_eq!(matcher.score(&query, &full), 3);
    }

    #[test]
    fn attendee_local_part_match_adds_two() {
        let matcher = EventMatcher;
        let query = MatchQuery::new("marketing", None);
        let candidate = event("e1", "Budget", &["marketing", "ceo"], "2030-01-02T09:00:00");
        assert_eq!(matcher.score(&query, &candidate), 2);
    }

    #[test]
    fn adding_original_date_increases_score_by_exactly_four() {
        let matcher = EventMatcher;
        let candidate = event("e1", "Standup", &[], "2030-01-02T09:00:00");
        let without = matcher.score(&MatchQuery::new("standup", None), &candidate);
        let with = matcher.score(&MatchQuery::new("standup", Some("2030-01-02")), &candidate);
        assert_eq!(with, without + ORIGINAL_DATE_SCORE);
    }

    #[test]
    fn ties_resolve_to_earliest_candidate() {
        let matcher = EventMatcher;
        let candidates = vec![
            event("early", "Planning A", &[], "2030-01-02T09:00:00"),
            event("late", "Planning B", &[], "2030-01-03T09:00:00"),
        ];
        let found =
            matcher.best_match(&MatchQuery::new("planning", None), &candidates).expect("match");
        assert_eq!(found.candidate.id, "early");
        assert_eq!(found.index, 0);
    }

    #[test]
    fn zero_scores_report_no_match() {
        let matcher = EventMatcher;
        let candidates = vec![event("e1", "Design Review", &["design"], "2030-01-02T09:00:00")];
        assert!(matcher.best_match(&MatchQuery::new("budget", None), &candidates).is_none());
        assert!(matcher.best_match::<CalendarEvent>(&MatchQuery::new("x", None), &[]).is_none());
    }

    #[test]
    fn single_shared_word_is_enough_to_match() {
        let matcher = EventMatcher;
        let candidates = vec![
            event("e1", "Design Review", &[], "2030-01-02T09:00:00"),
            event("e2", "Quarterly review of hiring", &[], "2030-01-03T09:00:00"),
        ];
        let found = matcher
            .best_match(&MatchQuery::new("hiring plan", None), &candidates)
            .expect("weak match accepted");
        assert_eq!(found.candidate.id, "e2");
        assert_eq!(found.score, 1);
    }

    #[test]
    fn cancellation_applies_only_supplied_criteria() {
        let candidates = [
            event("e1", "Sync with marketing", &["marketing"], "2030-01-02T09:00:00"),
            event("e2", "Sync Retro", &["engineering"], "2030-01-03T09:00:00"),
            event("e3", "Design Review", &["design"], "2030-01-03T11:00:00"),
        ];

        let by_title = CancellationCriteria::new(Some("sync"), &[], None);
        let selected: Vec<_> =
            candidates.iter().filter(|c| by_title.matches(*c)).map(|c| c.id.as_str()).collect();
        assert_eq!(selected, vec!["e1", "e2"]);

        let by_title_and_date = CancellationCriteria::new(Some("sync"), &[], Some("2030-01-03"));
        let selected: Vec<_> = candidates
            .iter()
            .filter(|c| by_title_and_date.matches(*c))
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(selected, vec!["e2"]);

        let by_participant = CancellationCriteria::new(None, &["Design".to_string()], None);
        assert!(!by_participant.matches(&candidates[0]));
        assert!(by_participant.matches(&candidates[2]));
    }

    #[test]
    fn blank_criteria_are_unrestricted() {
        let criteria = CancellationCriteria::new(Some("  "), &[String::new()], None);
        assert!(criteria.is_unrestricted());
        assert!(criteria.matches(&event("e1", "Anything", &[], "2030-01-02T09:00:00")));
    }
}
