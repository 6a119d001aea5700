//! Calendar-store collaborator for huddle: the [`CalendarStore`] contract,
//! an in-memory store and a SQLite store with embedded migrations.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_calendar, connect_with_settings, DbPool};
pub use repositories::{CalendarError, CalendarStore, InMemoryCalendarStore, SqlCalendarStore};
