use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod channel_protocol;

pub use channel_protocol::{
    decode_message, encode_message, ChannelMessage, MessageError, DEFAULT_MAX_FRAME_BYTES,
};

/// Identifier of a project created through the submission flow.
///
/// Always non-empty and free of surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Returns `None` for empty or blank input: a project that does not exist yet.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        ProjectId::parse(&raw).ok_or_else(|| de::Error::custom("project id cannot be empty"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    Intake,
    Scoping,
    CommunicationFilter,
    Payment,
    MediaGeneration,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Intake => "intake",
            AgentKind::Scoping => "scoping",
            AgentKind::CommunicationFilter => "communication_filter",
            AgentKind::Payment => "payment",
            AgentKind::MediaGeneration => "media_generation",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "intake" | "homeowner_intake" => Ok(AgentKind::Intake),
            "scoping" | "scope" | "project_scope" => Ok(AgentKind::Scoping),
            "communication_filter" | "security" | "contact_filter" => {
                Ok(AgentKind::CommunicationFilter)
            }
            "payment" | "payment_gate" => Ok(AgentKind::Payment),
            "media" | "media_processor" | "media_generation" | "ui_generator"
            | "ui_generation" => Ok(AgentKind::MediaGeneration),
            _ => Err(format!("Unknown agent type: {input}")),
        }
    }
}

impl Serialize for AgentKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Processing,
    Waiting,
    Active,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Processing => "processing",
            AgentStatus::Waiting => "waiting",
            AgentStatus::Active => "active",
            AgentStatus::Error => "error",
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AgentStatus::Processing | AgentStatus::Active)
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend worker as reported by the latest swarm snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub status: AgentStatus,
    #[serde(
        default,
        rename = "currentTask",
        alias = "current_task",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStage {
    Intake,
    Scoping,
    Matching,
    Payment,
    Complete,
}

impl Default for ProjectStage {
    fn default() -> Self {
        Self::Intake
    }
}

impl ProjectStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStage::Intake => "intake",
            ProjectStage::Scoping => "scoping",
            ProjectStage::Matching => "matching",
            ProjectStage::Payment => "payment",
            ProjectStage::Complete => "complete",
        }
    }
}

impl fmt::Display for ProjectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectUpdate {
    #[serde(rename = "projectId", alias = "project_id")]
    pub project_id: String,
    pub stage: ProjectStage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmHealth {
    Healthy,
    Degraded,
    Critical,
}

impl SwarmHealth {
    /// Critical once at least half of the swarm reports `error`.
    pub fn from_agents(agents: &[AgentRecord]) -> Self {
        let failed = agents
            .iter()
            .filter(|agent| agent.status == AgentStatus::Error)
            .count();
        if failed == 0 {
            SwarmHealth::Healthy
        } else if failed * 2 >= agents.len() {
            SwarmHealth::Critical
        } else {
            SwarmHealth::Degraded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SwarmHealth::Healthy => "healthy",
            SwarmHealth::Degraded => "degraded",
            SwarmHealth::Critical => "critical",
        }
    }
}

impl fmt::Display for SwarmHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
