//! Offline keyword understanding of calendar requests.
//!
//! Deterministic and network-free: the default collaborator when no LLM
//! provider is configured, and the one the scenario tests drive.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use huddle_core::clock::Clock;
use huddle_core::domain::agent::AgentId;
use huddle_core::domain::meeting::SlotName;

use crate::understanding::{
    CalendarAction, CalendarIntent, CancellationDetails, EntityExtractor, IntentClassifier,
    MeetingDetails, ReschedulingDetails, UnderstandingError,
};

const LABELS: [&str; 5] = ["title", "date", "time", "participants", "duration"];

const RESCHEDULE_VERBS: [&str; 4] = ["reschedule", "postpone", "move", "push"];
const CANCEL_VERBS: [&str; 4] = ["cancel", "delete", "remove", "drop"];

/// Words that end a meeting reference ("the standup" in "move the standup
/// to friday").
const REFERENCE_STOPS: [&str; 14] = [
    "to", "until", "from", "on", "at", "for", "with", "tomorrow", "today", "yesterday", "by",
    "back", "instead", "please",
];

const FILLER_WORDS: [&str; 8] = ["the", "my", "our", "a", "an", "all", "every", "that"];
const MEETING_NOUNS: [&str; 4] = ["meeting", "meetings", "call", "calls"];

#[derive(Clone)]
pub struct RuleBasedUnderstanding {
    vocabulary: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl RuleBasedUnderstanding {
    /// `roster` is the set of names recognized as participants in free text.
    pub fn new(roster: &[AgentId], clock: Arc<dyn Clock>) -> Self {
        Self {
            vocabulary: roster.iter().map(|agent| agent.as_str().to_string()).collect(),
            clock,
        }
    }

    pub fn classify(&self, text: &str) -> CalendarIntent {
        let normalized_text = normalize_text(text);
        let tokens = tokenize(&normalized_text);
        let Some(action) = classify_action(&normalized_text, &tokens) else {
            return CalendarIntent::not_calendar();
        };

        let missing_info = if action == CalendarAction::ScheduleMeeting {
            let details = self.meeting_details(text);
            let mut missing = Vec::new();
            if details.title.is_empty() {
                missing.push(SlotName::Title);
            }
            if details.date.is_empty() {
                missing.push(SlotName::Date);
            }
            if details.time.is_empty() {
                missing.push(SlotName::Time);
            }
            if details.participants.is_empty() {
                missing.push(SlotName::Participants);
            }
            missing
        } else {
            Vec::new()
        };

        CalendarIntent { is_calendar_command: true, action: Some(action), missing_info }
    }

    pub fn meeting_details(&self, text: &str) -> MeetingDetails {
        let labeled = labeled_fields(text);
        let free_text = &text[..first_label_offset(text).unwrap_or(text.len())];
        let free_words = words(free_text);
        let today = self.clock.today();

        let title = labeled
            .get("title")
            .cloned()
            .or_else(|| quoted_text(free_text))
            .or_else(|| title_after_keyword(free_text))
            .unwrap_or_default();

        let participants = match labeled.get("participants") {
            Some(listed) => split_names(listed),
            None => self.known_names(&free_words),
        };

        let date = match labeled.get("date") {
            Some(value) => parse_date_phrase(value, today).unwrap_or_else(|| value.clone()),
            None => find_date(&free_words, today).unwrap_or_default(),
        };

        let time = match labeled.get("time") {
            Some(value) => parse_time_phrase(value).unwrap_or_else(|| value.clone()),
            None => find_time(&free_words).unwrap_or_default(),
        };

        let duration = match labeled.get("duration") {
            Some(value) => {
                let duration_words = words(value);
                find_duration(&duration_words).or_else(|| value.trim().parse::<u32>().ok())
            }
            None => find_duration(&free_words),
        };

        MeetingDetails { title, participants, date, time, duration }
    }

    pub fn rescheduling_details(&self, text: &str) -> ReschedulingDetails {
        let today = self.clock.today();
        let all_words = words(text);
        let after_verb = words_after(&all_words, &RESCHEDULE_VERBS);

        let reference_len = reference_length(after_verb, today);
        let meeting_identifier = quoted_text(text)
            .unwrap_or_else(|| clean_reference(&after_verb[..reference_len]))
            .to_lowercase();

        let rest = &after_verb[reference_len..];
        let split = rest.iter().position(|word| matches!(lower(word).as_str(), "to" | "until"));
        let (original_part, new_part) = match split {
            Some(index) => (&rest[..index], &rest[index + 1..]),
            None => (&rest[..0], rest),
        };

        let original_date = original_part
            .windows(2)
            .find(|pair| matches!(lower(&pair[0]).as_str(), "from" | "on"))
            .and_then(|pair| parse_date_phrase(&pair[1], today));

        ReschedulingDetails {
            meeting_identifier,
            original_date,
            new_date: find_date(new_part, today).unwrap_or_default(),
            new_time: find_time(new_part).unwrap_or_default(),
            new_duration: find_duration(new_part),
        }
    }

    pub fn cancellation_details(&self, text: &str) -> CancellationDetails {
        let today = self.clock.today();
        let all_words = words(text);
        let after_verb = words_after(&all_words, &CANCEL_VERBS);

        let reference_len = reference_length(after_verb, today);
        let title = quoted_text(text)
            .or_else(|| Some(clean_reference(&after_verb[..reference_len])))
            .filter(|title| !title.is_empty());

        let with_participants = after_verb
            .iter()
            .position(|word| lower(word) == "with")
            .map(|index| self.known_names(&after_verb[index + 1..]))
            .unwrap_or_default();

        CancellationDetails { title, with_participants, date: find_date(after_verb, today) }
    }

    fn known_names(&self, words: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for word in words {
            let candidate = lower(word);
            if self.vocabulary.contains(&candidate) && !names.contains(&candidate) {
                names.push(candidate);
            }
        }
        names
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedUnderstanding {
    async fn classify_calendar_intent(
        &self,
        text: &str,
    ) -> Result<CalendarIntent, UnderstandingError> {
        Ok(self.classify(text))
    }
}

#[async_trait]
impl EntityExtractor for RuleBasedUnderstanding {
    async fn extract_meeting_details(
        &self,
        text: &str,
    ) -> Result<MeetingDetails, UnderstandingError> {
        Ok(self.meeting_details(text))
    }

    async fn extract_rescheduling_details(
        &self,
        text: &str,
    ) -> Result<ReschedulingDetails, UnderstandingError> {
        Ok(self.rescheduling_details(text))
    }

    async fn extract_cancellation_details(
        &self,
        text: &str,
    ) -> Result<CancellationDetails, UnderstandingError> {
        Ok(self.cancellation_details(text))
    }
}

fn classify_action(normalized_text: &str, tokens: &[String]) -> Option<CalendarAction> {
    let has_token = |candidates: &[&str]| tokens.iter().any(|token| candidates.contains(&token.as_str()));
    let mentions_meeting = has_token(&["meeting", "meetings", "call", "standup", "sync", "calendar"]);

    if has_token(&["reschedule", "postpone"])
        || (has_token(&["move", "push"]) && mentions_meeting)
    {
        return Some(CalendarAction::RescheduleMeeting);
    }
    if has_token(&["cancel"]) || normalized_text.contains("call off") {
        return Some(CalendarAction::CancelMeeting);
    }
    if (has_token(&["list", "show", "upcoming", "agenda"]) || normalized_text.contains("what meetings"))
        && (mentions_meeting || has_token(&["schedule", "upcoming", "agenda"]))
    {
        return Some(CalendarAction::ListMeetings);
    }
    if has_token(&["schedule", "book", "arrange", "organize", "organise"])
        || normalized_text.contains("set up")
        || (mentions_meeting && has_token(&["with", "about"]))
    {
        return Some(CalendarAction::ScheduleMeeting);
    }
    None
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, ':' | '-') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Whitespace words with surrounding punctuation removed, original case.
fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|character: char| {
                !character.is_ascii_alphanumeric() && character != ':' && character != '-'
            })
            .trim_end_matches(':')
            .to_string()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn lower(word: &str) -> String {
    word.to_ascii_lowercase()
}

fn words_after<'a>(words: &'a [String], verbs: &[&str]) -> &'a [String] {
    words
        .iter()
        .position(|word| verbs.contains(&lower(word).as_str()))
        .map(|index| &words[index + 1..])
        .unwrap_or(words)
}

/// Number of leading words that name the meeting itself.
fn reference_length(words: &[String], today: NaiveDate) -> usize {
    words
        .iter()
        .position(|word| {
            REFERENCE_STOPS.contains(&lower(word).as_str())
                || parse_date_phrase(word, today).is_some()
                || parse_time_phrase(word).is_some()
        })
        .unwrap_or(words.len())
}

fn clean_reference(words: &[String]) -> String {
    let mut start = 0;
    let mut end = words.len();
    while start < end && FILLER_WORDS.contains(&lower(&words[start]).as_str()) {
        start += 1;
    }
    while end > start && MEETING_NOUNS.contains(&lower(&words[end - 1]).as_str()) {
        end -= 1;
    }
    words[start..end].join(" ")
}

fn first_label_offset(text: &str) -> Option<usize> {
    label_positions(text).into_iter().map(|(offset, _, _)| offset).min()
}

/// `(label offset, label, value offset)` for every `Label:` marker.
fn label_positions(text: &str) -> Vec<(usize, &'static str, usize)> {
    let normalized_text = normalize_text(text);
    let bytes = normalized_text.as_bytes();
    let mut positions = Vec::new();

    for label in LABELS {
        let marker = format!("{label}:");
        let mut search_from = 0;
        while let Some(found) = normalized_text[search_from..].find(&marker) {
            let offset = search_from + found;
            let at_boundary = offset == 0 || !bytes[offset - 1].is_ascii_alphanumeric();
            if at_boundary {
                positions.push((offset, label, offset + marker.len()));
            }
            search_from = offset + marker.len();
        }
    }

    positions.sort_by_key(|(offset, _, _)| *offset);
    positions
}

/// Values of `Title: x. Date: y.` style segments. The last occurrence of a
/// label wins.
fn labeled_fields(text: &str) -> BTreeMap<&'static str, String> {
    let positions = label_positions(text);
    let mut fields = BTreeMap::new();

    for (index, (_, label, value_start)) in positions.iter().enumerate() {
        let value_end = positions.get(index + 1).map(|(offset, _, _)| *offset).unwrap_or(text.len());
        let value = text[*value_start..value_end].trim().trim_end_matches('.').trim();
        if !value.is_empty() {
            fields.insert(*label, value.to_string());
        }
    }

    fields
}

/// Text between a pair of quotes. An apostrophe inside a word ("let's")
/// does not open a quote.
fn quoted_text(text: &str) -> Option<String> {
    let characters: Vec<char> = text.chars().collect();
    let is_quote = |character: char| matches!(character, '\'' | '"' | '\u{201c}' | '\u{201d}');

    for (open, character) in characters.iter().enumerate() {
        if !is_quote(*character) {
            continue;
        }
        let opens = open == 0 || !characters[open - 1].is_alphanumeric();
        if !opens {
            continue;
        }
        for close in open + 1..characters.len() {
            if !is_quote(characters[close]) {
                continue;
            }
            let closes = close + 1 == characters.len() || !characters[close + 1].is_alphanumeric();
            if closes {
                let inner: String = characters[open + 1..close].iter().collect();
                let inner = inner.trim();
                if !inner.is_empty() {
                    return Some(inner.to_string());
                }
                break;
            }
        }
    }
    None
}

fn title_after_keyword(text: &str) -> Option<String> {
    let all_words = words(text);
    let start = all_words
        .iter()
        .position(|word| matches!(lower(word).as_str(), "about" | "titled" | "called" | "named" | "regarding"))?;

    let title_words: Vec<&String> = all_words[start + 1..]
        .iter()
        .take_while(|word| {
            !matches!(
                lower(word).as_str(),
                "with" | "on" | "at" | "for" | "tomorrow" | "today" | "yesterday" | "and"
            )
        })
        .collect();

    let title = title_words.iter().map(|word| word.as_str()).collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn split_names(listed: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for word in words(&listed.replace(['&', ','], " ")) {
        let name = lower(&word);
        if matches!(name.as_str(), "and" | "the" | "with" | "team" | "lead") {
            continue;
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// ISO `YYYY-MM-DD` (validated) or `today` / `tomorrow` / `yesterday`.
pub fn parse_date_phrase(value: &str, today: NaiveDate) -> Option<String> {
    let value = lower(value.trim());
    let date = match value.as_str() {
        "today" => today,
        "tomorrow" => today + Duration::days(1),
        "yesterday" => today - Duration::days(1),
        other => NaiveDate::parse_from_str(other, "%Y-%m-%d").ok()?,
    };
    Some(date.format("%Y-%m-%d").to_string())
}

/// `HH:MM` (24-hour), `3pm`, `3:30pm`, `3 pm` or `noon`, as `HH:MM`.
pub fn parse_time_phrase(value: &str) -> Option<String> {
    let compact: String = lower(value.trim()).chars().filter(|character| !character.is_whitespace()).collect();
    if compact == "noon" {
        return Some("12:00".to_string());
    }

    let (clock, meridiem) = if let Some(prefix) = compact.strip_suffix("am") {
        (prefix, Some(false))
    } else if let Some(prefix) = compact.strip_suffix("pm") {
        (prefix, Some(true))
    } else {
        (compact.as_str(), None)
    };

    let (hour, minute) = match clock.split_once(':') {
        Some((hour, minute)) if minute.len() == 2 => (hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?),
        Some(_) => return None,
        None if meridiem.is_some() => (clock.parse::<u32>().ok()?, 0),
        None => return None,
    };
    if minute > 59 {
        return None;
    }

    let hour = match meridiem {
        Some(_) if hour == 0 || hour > 12 => return None,
        Some(false) => hour % 12,
        Some(true) => hour % 12 + 12,
        None if hour > 23 => return None,
        None => hour,
    };
    Some(format!("{hour:02}:{minute:02}"))
}

fn find_date(words: &[String], today: NaiveDate) -> Option<String> {
    words.iter().find_map(|word| parse_date_phrase(word, today))
}

fn find_time(words: &[String]) -> Option<String> {
    for (index, word) in words.iter().enumerate() {
        if let Some(time) = parse_time_phrase(word) {
            return Some(time);
        }
        if let Some(next) = words.get(index + 1) {
            if matches!(lower(next).as_str(), "am" | "pm") {
                if let Some(time) = parse_time_phrase(&format!("{word}{next}")) {
                    return Some(time);
                }
            }
        }
        let after_at = index > 0 && lower(&words[index - 1]) == "at";
        if after_at {
            if let Ok(hour) = word.parse::<u32>() {
                if hour <= 23 {
                    return Some(format!("{hour:02}:00"));
                }
            }
        }
    }
    None
}

fn find_duration(words: &[String]) -> Option<u32> {
    let lowered: Vec<String> = words.iter().map(|word| lower(word)).collect();
    for (index, word) in lowered.iter().enumerate() {
        let Some(unit) = lowered.get(index + 1) else {
            continue;
        };
        let amount = match word.as_str() {
            "an" | "one" | "a" => Some(1),
            "half" if lowered.get(index + 2).map(String::as_str) == Some("hour") => {
                return Some(30);
            }
            number => number.parse::<u32>().ok(),
        };
        let Some(amount) = amount else {
            continue;
        };
        match unit.as_str() {
            "minute" | "minutes" | "min" | "mins" => return Some(amount),
            "hour" | "hours" | "hr" | "hrs" => return amount.checked_mul(60),
            _ => {}
        }
    }
    None
}
