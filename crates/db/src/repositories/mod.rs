use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

use huddle_core::domain::calendar::{CalendarEvent, NewEvent};

pub mod calendar;
pub mod memory;

pub use calendar::SqlCalendarStore;
pub use memory::InMemoryCalendarStore;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("calendar store is unavailable")]
    Unavailable,
    #[error("calendar event `{0}` was not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Calendar collaborator. Events are keyed by an opaque id assigned on
/// creation; every call is a single round trip with no retry.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, CalendarError>;

    /// Events starting at or after `from`, earliest first, at most `max`.
    async fn list_upcoming(
        &self,
        max: u32,
        from: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, CalendarError>;

    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError>;

    async fn delete_event(&self, id: &str) -> Result<(), CalendarError>;
}
