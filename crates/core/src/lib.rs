//! Core domain for the huddle multi-agent scheduler: slot filling, event
//! matching, date parsing, the audit trail, and layered configuration.

pub mod audit;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod matcher;
pub mod schedule;
pub mod slots;

pub use audit::{AuditCategory, AuditContext, AuditOutcome, AuditRecord, AuditSink};
pub use clock::{Clock, FixedClock, SystemClock};
pub use domain::agent::{AgentId, AgentProfile};
pub use domain::calendar::{
    Attendee, CalendarEvent, EventTime, MirrorEntry, NewEvent, Reminder, ReminderMethod,
};
pub use domain::meeting::{MeetingContext, SlotName, UnknownSlotName};
pub use domain::task::{Task, TaskId, TaskPriority};
pub use errors::{ApplicationError, DomainError, FailureKind, InterfaceError};
pub use matcher::{CancellationCriteria, EventMatcher, MatchCandidate, MatchQuery, ScoredMatch};
pub use schedule::StartParse;
pub use slots::{Completion, SlotFillingEngine, SlotPrompt, SlotState, SlotStep, SlotTransitionError};
