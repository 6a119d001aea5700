//! Agent runtime for huddle.
//!
//! Turns free-text messages from an agent into calendar operations:
//!
//! 1. **Understanding** (`understanding`, `conversation`, `llm`): classify the
//!    calendar intent and extract typed meeting details, either with the
//!    offline rule-based parser or an LLM behind a strict JSON schema.
//! 2. **Dialogue** (`session`): one slot-filling context per agent while
//!    details are still missing.
//! 3. **Orchestration** (`orchestrator`): validate, call the calendar store,
//!    update mirrors and notify participants (`network`, `fanout`).
//! 4. **Runtime** (`runtime`): per-agent entry point returning the
//!    `Response:` lines for a turn. Task quick commands (`tasks`) skip
//!    classification.
//!
//! The LLM only extracts. Validation, matching and every calendar mutation
//! are deterministic.

pub mod conversation;
pub mod fanout;
pub mod llm;
pub mod network;
pub mod orchestrator;
pub mod runtime;
pub mod session;
pub mod tasks;
pub mod understanding;

pub use conversation::RuleBasedUnderstanding;
pub use network::{InboxMessage, Messenger, Network};
pub use orchestrator::{SchedulingOrchestrator, SchedulingOutcome, SchedulingSettings};
pub use runtime::{AgentDirectory, AgentReply, AgentRuntime};
pub use session::SessionStore;
