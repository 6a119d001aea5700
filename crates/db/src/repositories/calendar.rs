use chrono::{NaiveDateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use huddle_core::domain::calendar::{Attendee, CalendarEvent, EventTime, NewEvent, Reminder};
use huddle_core::schedule::event_timestamp;

use super::{CalendarError, CalendarStore};
use crate::DbPool;

/// SQLite-backed calendar. Start and end timestamps are stored as wall-clock
/// `YYYY-MM-DDTHH:MM:SS` text so that string order equals time order.
pub struct SqlCalendarStore {
    pool: DbPool,
}

impl SqlCalendarStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CalendarStore for SqlCalendarStore {
    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, CalendarError> {
        let created = event.into_event(Uuid::new_v4().to_string());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO calendar_event (
                id,
                summary,
                description,
                start_date_time,
                start_time_zone,
                end_date_time,
                end_time_zone,
                attendees_json,
                reminders_json,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&created.id)
        .bind(&created.summary)
        .bind(created.description.as_deref())
        .bind(normalized_timestamp("start", &created.start)?)
        .bind(&created.start.time_zone)
        .bind(normalized_timestamp("end", &created.end)?)
        .bind(&created.end.time_zone)
        .bind(encode_json("attendees", &created.attendees)?)
        .bind(encode_json("reminders", &created.reminders)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_event(&created.id)
            .await?
            .ok_or_else(|| CalendarError::Decode(format!("event `{}` vanished after insert", created.id)))
    }

    async fn list_upcoming(
        &self,
        max: u32,
        from: NaiveDateTime,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let rows = sqlx::query(
            "SELECT
                id,
                summary,
                description,
                start_date_time,
                start_time_zone,
                end_date_time,
                end_time_zone,
                attendees_json,
                reminders_json
             FROM calendar_event
             WHERE start_date_time >= ?
             ORDER BY start_date_time ASC, created_at ASC
             LIMIT ?",
        )
        .bind(event_timestamp(from))
        .bind(i64::from(max))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(event_from_row).collect()
    }

    async fn get_event(&self, id: &str) -> Result<Option<CalendarEvent>, CalendarError> {
        let row = sqlx::query(
            "SELECT
                id,
                summary,
                description,
                start_date_time,
                start_time_zone,
                end_date_time,
                end_time_zone,
                attendees_json,
                reminders_json
             FROM calendar_event
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(event_from_row).transpose()
    }

    async fn update_event(&self, event: CalendarEvent) -> Result<CalendarEvent, CalendarError> {
        let result = sqlx::query(
            "UPDATE calendar_event SET
                summary = ?,
                description = ?,
                start_date_time = ?,
                start_time_zone = ?,
                end_date_time = ?,
                end_time_zone = ?,
                attendees_json = ?,
                reminders_json = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&event.summary)
        .bind(event.description.as_deref())
        .bind(normalized_timestamp("start", &event.start)?)
        .bind(&event.start.time_zone)
        .bind(normalized_timestamp("end", &event.end)?)
        .bind(&event.end.time_zone)
        .bind(encode_json("attendees", &event.attendees)?)
        .bind(encode_json("reminders", &event.reminders)?)
        .bind(Utc::now().to_rfc3339())
        .bind(&event.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CalendarError::NotFound(event.id));
        }

        self.get_event(&event.id).await?.ok_or(CalendarError::NotFound(event.id))
    }

    async fn delete_event(&self, id: &str) -> Result<(), CalendarError> {
        let result = sqlx::query("DELETE FROM calendar_event WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CalendarError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn event_from_row(row: SqliteRow) -> Result<CalendarEvent, CalendarError> {
    let attendees: Vec<Attendee> =
        decode_json("attendees_json", row.try_get::<String, _>("attendees_json")?)?;
    let reminders: Vec<Reminder> =
        decode_json("reminders_json", row.try_get::<String, _>("reminders_json")?)?;

    Ok(CalendarEvent {
        id: row.try_get("id")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        start: EventTime::new(
            row.try_get::<String, _>("start_date_time")?,
            row.try_get::<String, _>("start_time_zone")?,
        ),
        end: EventTime::new(
            row.try_get::<String, _>("end_date_time")?,
            row.try_get::<String, _>("end_time_zone")?,
        ),
        attendees,
        reminders,
    })
}

fn normalized_timestamp(field: &str, time: &EventTime) -> Result<String, CalendarError> {
    time.naive().map(event_timestamp).ok_or_else(|| {
        CalendarError::Decode(format!("invalid {field} timestamp `{}`", time.date_time))
    })
}

fn encode_json<T: serde::Serialize>(field: &str, value: &T) -> Result<String, CalendarError> {
    serde_json::to_string(value)
        .map_err(|error| CalendarError::Decode(format!("could not encode {field}: {error}")))
}

fn decode_json<T: serde::de::DeserializeOwned>(
    column: &str,
    value: String,
) -> Result<T, CalendarError> {
    serde_json::from_str(&value).map_err(|error| {
        CalendarError::Decode(format!("invalid json in `{column}`: `{value}` ({error})"))
    })
}

#[cfg(test)]
mod tests {
    use huddle_core::domain::calendar::EventTime;

    use super::normalized_timestamp;

    #[test]
    fn timestamps_are_normalized_to_wall_clock_seconds() {
        let offset = EventTime::new("2031-03-06T09:30:00+02:00", "Europe/Berlin");
        assert_eq!(
            normalized_timestamp("start", &offset).expect("normalize"),
            "2031-03-06T09:30:00"
        );

        let minutes_only = EventTime::new("2031-03-06T09:30", "UTC");
        assert_eq!(
            normalized_timestamp("start", &minutes_only).expect("normalize"),
            "2031-03-06T09:30:00"
        );

        assert!(normalized_timestamp("start", &EventTime::new("soon", "UTC")).is_err());
    }
}
