use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry key for an agent. Always trimmed and lower-cased so that role
/// names coming from free text compare equal to configured ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Sender used for notifications that do not originate from an agent.
    pub fn system() -> Self {
        Self("system".to_string())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub title: String,
    pub description: String,
}

impl AgentProfile {
    pub fn new(
        id: impl AsRef<str>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self { id: AgentId::new(id), title: title.into(), description: description.into() }
    }
}
