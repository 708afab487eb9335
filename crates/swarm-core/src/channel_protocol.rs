use crate::{AgentRecord, ProjectUpdate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Backend-to-client message on the agent-state channel.
///
/// Exactly two shapes are accepted; anything else fails to decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Full snapshot of the swarm. Replaces every previously known agent.
    SwarmStatus(Vec<AgentRecord>),
    ProjectUpdate(ProjectUpdate),
}

impl ChannelMessage {
    /// Field checks that serde cannot express on its own.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            ChannelMessage::SwarmStatus(agents) => {
                let mut seen = HashSet::with_capacity(agents.len());
                for (index, agent) in agents.iter().enumerate() {
                    if agent.id.trim().is_empty() {
                        return Err(MessageError::EmptyAgentId { index });
                    }
                    if !seen.insert(agent.id.as_str()) {
                        return Err(MessageError::DuplicateAgentId(agent.id.clone()));
                    }
                    if let Some(progress) = agent.progress {
                        if !(0.0..=100.0).contains(&progress) {
                            return Err(MessageError::ProgressOutOfRange {
                                id: agent.id.clone(),
                                value: progress,
                            });
                        }
                    }
                }
                Ok(())
            }
            ChannelMessage::ProjectUpdate(update) => {
                if update.project_id.trim().is_empty() {
                    return Err(MessageError::EmptyProjectId);
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error("frame exceeds max size: {size} > {max}")]
    OversizedFrame { size: usize, max: usize },
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("frame encode failed: {0}")]
    Encode(String),
    #[error("agent at index {index} has an empty id")]
    EmptyAgentId { index: usize },
    #[error("duplicate agent id in snapshot: {0}")]
    DuplicateAgentId(String),
    #[error("agent {id} progress out of range: {value}")]
    ProgressOutOfRange { id: String, value: f32 },
    #[error("project update has an empty project id")]
    EmptyProjectId,
}

pub fn decode_message(raw: &str, max_frame_bytes: usize) -> Result<ChannelMessage, MessageError> {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if trimmed.len() > max_frame_bytes {
        return Err(MessageError::OversizedFrame {
            size: trimmed.len(),
            max: max_frame_bytes,
        });
    }
    let message: ChannelMessage =
        serde_json::from_str(trimmed).map_err(|err| MessageError::Decode(err.to_string()))?;
    message.validate()?;
    Ok(message)
}

pub fn encode_message(
    message: &ChannelMessage,
    max_frame_bytes: usize,
) -> Result<String, MessageError> {
    let encoded =
        serde_json::to_string(message).map_err(|err| MessageError::Encode(err.to_string()))?;
    if encoded.len() > max_frame_bytes {
        return Err(MessageError::OversizedFrame {
            size: encoded.len(),
            max: max_frame_bytes,
        });
    }
    Ok(encoded)
}
