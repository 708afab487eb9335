use std::time::Duration;
use swarm_core::{ProjectId, DEFAULT_MAX_FRAME_BYTES};
use thiserror::Error;
use url::Url;

pub const DEFAULT_CHANNEL_URL: &str = "ws://127.0.0.1:8000/ws/agent-swarm";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid channel url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported channel url scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("channel url cannot carry a project path segment: {0}")]
    CannotBeABase(String),
    #[error("max frame bytes must be greater than zero")]
    ZeroFrameLimit,
}

/// Retry schedule after a dropped connection. Off unless configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed attempts before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    base_url: Url,
    max_frame_bytes: usize,
    reconnect: Option<ReconnectPolicy>,
}

impl ChannelConfig {
    pub fn new(base_url: Url) -> Result<Self, ConfigError> {
        match base_url.scheme() {
            "ws" | "wss" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::CannotBeABase(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            reconnect: None,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim()).map_err(|err| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        Self::new(url)
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Result<Self, ConfigError> {
        if max_frame_bytes == 0 {
            return Err(ConfigError::ZeroFrameLimit);
        }
        self.max_frame_bytes = max_frame_bytes;
        Ok(self)
    }

    pub fn with_reconnect(mut self, policy: Option<ReconnectPolicy>) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    pub fn reconnect(&self) -> Option<&ReconnectPolicy> {
        self.reconnect.as_ref()
    }

    /// Base url with the project id appended as a single path segment.
    pub fn endpoint_for(&self, project_id: &ProjectId) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(project_id.as_str());
        }
        url
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_CHANNEL_URL).expect("default channel url"),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            reconnect: None,
        }
    }
}
