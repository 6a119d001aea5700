pub mod engine;
pub mod states;

pub use engine::{SlotFillingEngine, SlotTransitionError};
pub use states::{Completion, SlotPrompt, SlotState, SlotStep};
