use std::fmt;
use swarm_core::{
    decode_message, AgentRecord, ChannelMessage, MessageError, ProjectId, ProjectStage,
    SwarmHealth,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciled view of one project subscription.
///
/// Observers only ever see clones of this value; the owning
/// [`ChannelClient`](crate::ChannelClient) is the single writer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelState {
    pub project_id: Option<ProjectId>,
    pub agents: Vec<AgentRecord>,
    pub stage: ProjectStage,
    pub last_message: String,
    pub connection: ConnectionState,
    /// Set once any connection for this subscription has opened; survives
    /// the later drop to `Disconnected`.
    pub connected_once: bool,
}

/// What a single inbound frame did to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    AgentsReplaced { count: usize },
    ProjectUpdated { stage: ProjectStage },
    CrossProject { project_id: String },
    Rejected(MessageError),
}

impl FrameOutcome {
    pub fn changed_state(&self) -> bool {
        matches!(
            self,
            FrameOutcome::AgentsReplaced { .. } | FrameOutcome::ProjectUpdated { .. }
        )
    }
}

impl ChannelState {
    pub fn connecting(project_id: ProjectId) -> Self {
        Self {
            project_id: Some(project_id),
            connection: ConnectionState::Connecting,
            ..Self::default()
        }
    }

    pub fn health(&self) -> SwarmHealth {
        SwarmHealth::from_agents(&self.agents)
    }

    pub fn agent(&self, id: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|agent| agent.id == id)
    }

    pub fn is_subscribed_to(&self, project_id: &str) -> bool {
        self.project_id
            .as_ref()
            .is_some_and(|subscribed| subscribed.as_str() == project_id)
    }

    /// Decode, validate and reconcile one raw frame. Never panics on bad input.
    pub fn apply_frame(&mut self, raw: &str, max_frame_bytes: usize) -> FrameOutcome {
        match decode_message(raw, max_frame_bytes) {
            Ok(message) => self.apply_message(message),
            Err(err) => FrameOutcome::Rejected(err),
        }
    }

    pub fn apply_message(&mut self, message: ChannelMessage) -> FrameOutcome {
        match message {
            ChannelMessage::SwarmStatus(agents) => {
                let count = agents.len();
                self.agents = agents;
                FrameOutcome::AgentsReplaced { count }
            }
            ChannelMessage::ProjectUpdate(update) => {
                if !self.is_subscribed_to(&update.project_id) {
                    return FrameOutcome::CrossProject {
                        project_id: update.project_id,
                    };
                }
                self.stage = update.stage;
                self.last_message = update.message;
                FrameOutcome::ProjectUpdated {
                    stage: update.stage,
                }
            }
        }
    }
}
