use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use huddle_core::domain::calendar::{CalendarEvent, NewEvent};

use super::{CalendarError, CalendarStore};

/// Process-local calendar. `set_available(false)` makes every call fail
/// with [`CalendarError::Unavailable`].
pub struct InMemoryCalendarStore {
    events: RwLock<HashMap<String, CalendarEvent>>,
    available: AtomicBool,
    create_calls: AtomicUsize,
}

impl Default for InMemoryCalendarStore {
    fn default() -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            create_calls: AtomicUsize::new(0),
        }
    }
}

impl InMemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `create_event` calls that reached the store, including
    /// calls rejected while unavailable.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub async fn seed(&self, event: CalendarEvent) {
        let mut events = self.events.write().await;
        events.insert(event.id.clone(), event);
    }

    pub async fn all_events(&self) -> Vec<CalendarEvent> {
        let events = self.events.read().await;
        let mut all: Vec<CalendarEvent> = events.values().cloned().collect();
        all.sort_by(|left, right| {
            left.start.naive().cmp(&right.start.naive()).then_with(|| left.id.cmp(&right.id))
        });
        all
    }

    fn ensure_available(&self) -> Result<(), CalendarError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CalendarError::Unavailable)
        }
    }
}

#[async_trait::async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, CalendarError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;

        let created = event.into_event(Uuid::new_v4().to_string());
        let mut events = self.events.write().await;
        events.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn list_upcoming(
        &self,
        max: u32,
        from: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.ensure_available()?;

        let events = self.events.read().await;
        let mut upcoming: Vec<(NaiveDateTime, CalendarEvent)> = events
            .values()
            .filter_map(|event| event.start.naive().map(|start| (start, event.clone())))
            .filter(|(start, _)| *start >= from)
            .collect();
        upcoming.sort_by(|(left_start, left), (right_start, right)| {
            left_start.cmp(right_start).then_with(|| left.id.cmp(&right.id))
        });

        Ok(upcoming.into_iter().take(max as usize).map(|(_, event)| event).collect())
    }

    async fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, CalendarError> {
        self.ensure_available()?;

        let events = self.events.read().await;
        Ok(events.get(id).cloned())
    }

    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        self.ensure_available()?;

        let mut events = self.events.write().await;
        match events.get_mut(&event.id) {
            Some(existing) => {
                *existing = event.clone();
                Ok(event)
            }
            None => Err(CalendarError::NotFound(event.id)),
        }
    }

    async fn delete_event(&self, id: &str) -> Result<(), CalendarError> {
        self.ensure_available()?;

        let mut events = self.events.write().await;
        events.remove(id).map(|_| ()).ok_or_else(|| CalendarError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use huddle_core::domain::calendar::{Attendee, EventTime, NewEvent};

    use crate::repositories::{CalendarError, CalendarStore, InMemoryCalendarStore};

    fn new_event(summary: &str, start: &str, end: &str) -> NewEvent {
        NewEvent {
            summary: summary.to_string(),
            description: None,
            start: EventTime::new(start, "UTC"),
            end: EventTime::new(end, "UTC"),
            attendees: vec![Attendee::new("ceo@example.com")],
            reminders: Vec::new(),
        }
    }

    fn at(day: u32, hour: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2031, 3, day)
            .and_then(|date| date.and_hms_opt(hour, 0, 0))
            .expect("valid timestamp")
    }

    #[tokio::test]
    async fn list_upcoming_is_ordered_capped_and_skips_past_events() {
        let store = InMemoryCalendarStore::new();
        store
            .create_event(new_event("Later", "2031-03-07T09:00:00", "2031-03-07T10:00:00"))
            .await
            .expect("create later");
        store
            .create_event(new_event("Earlier", "2031-03-06T09:00:00", "2031-03-06T10:00:00"))
            .await
            .expect("create earlier");
        store
            .create_event(new_event("Past", "2031-03-01T09:00:00", "2031-03-01T10:00:00"))
            .await
            .expect("create past");

        let upcoming = store.list_upcoming(10, at(5, 0)).await.expect("list");
        let summaries: Vec<&str> = upcoming.iter().map(|event| event.summary.as_str()).collect();
        assert_eq!(summaries, vec!["Earlier", "Later"]);

        let capped = store.list_upcoming(1, at(5, 0)).await.expect("list capped");
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].summary, "Earlier");
    }

    #[tokio::test]
    async fn unavailable_store_rejects_every_call_but_counts_creates() {
        let store = InMemoryCalendarStore::new();
        store.set_available(false);

        let created = store
            .create_event(new_event("Sync", "2031-03-06T09:00:00", "2031-03-06T10:00:00"))
            .await;
        assert!(matches!(created, Err(CalendarError::Unavailable)));
        assert!(matches!(store.list_upcoming(5, at(1, 0)).await, Err(CalendarError::Unavailable)));
        assert_eq!(store.create_calls(), 1);

        store.set_available(true);
        assert!(store.list_upcoming(5, at(1, 0)).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_events() {
        let store = InMemoryCalendarStore::new();
        let created = store
            .create_event(new_event("Sync", "2031-03-06T09:00:00", "2031-03-06T10:00:00"))
            .await
            .expect("create");

        let mut moved = created.clone();
        moved.start = EventTime::new("2031-03-08T09:00:00", "UTC");
        store.update_event(moved).await.expect("update");
        let fetched = store.get_event(&created.id).await.expect("get").expect("event exists");
        assert_eq!(fetched.start.date_time, "2031-03-08T09:00:00");

        store.delete_event(&created.id).await.expect("delete");
        assert!(matches!(
            store.delete_event(&created.id).await,
            Err(CalendarError::NotFound(id)) if id == created.id
        ));
        assert!(matches!(
            store.update_event(fetched).await,
            Err(CalendarError::NotFound(_))
        ));
    }
}
