//! Client side of the agent-swarm state channel.
//!
//! A [`ChannelClient`] holds at most one live connection, scoped to the
//! project it is subscribed to. Every inbound frame is validated against the
//! `swarm_status` / `project_update` schema and reconciled into a
//! [`ChannelState`], which observers read through a `tokio::sync::watch`
//! receiver.

pub mod client;
pub mod config;
pub mod state;
pub mod transport;

pub use client::{ChannelClient, SubscriptionHandle};
pub use config::{ChannelConfig, ConfigError, ReconnectPolicy, DEFAULT_CHANNEL_URL};
pub use state::{ChannelState, ConnectionState, FrameOutcome};
pub use transport::{Transport, TransportEvent, WebSocketTransport};
