use crate::config::ChannelConfig;
use crate::state::{ChannelState, ConnectionState, FrameOutcome};
use crate::transport::{Transport, TransportEvent, WebSocketTransport};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use swarm_core::ProjectId;
use tokio::{sync::mpsc, sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};
use url::Url;

/// Identifies one call to [`ChannelClient::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    project_id: ProjectId,
}

impl SubscriptionHandle {
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }
}

struct ActiveSubscription {
    handle: SubscriptionHandle,
    closed: Arc<AtomicBool>,
    driver: JoinHandle<()>,
}

/// Keeps one agent-state connection per active project and reconciles its
/// frames into a [`ChannelState`] that any number of observers can watch.
pub struct ChannelClient<T: Transport = WebSocketTransport> {
    config: ChannelConfig,
    transport: Arc<T>,
    state: Arc<watch::Sender<ChannelState>>,
    active: Option<ActiveSubscription>,
    next_handle_id: u64,
}

impl ChannelClient<WebSocketTransport> {
    pub fn new(config: ChannelConfig) -> Self {
        Self::with_transport(config, WebSocketTransport)
    }
}

impl<T: Transport> ChannelClient<T> {
    pub fn with_transport(config: ChannelConfig, transport: T) -> Self {
        let (state, _) = watch::channel(ChannelState::default());
        Self {
            config,
            transport: Arc::new(transport),
            state: Arc::new(state),
            active: None,
            next_handle_id: 0,
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn watch(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ChannelState {
        self.state.borrow().clone()
    }

    pub fn active_handle(&self) -> Option<&SubscriptionHandle> {
        self.active.as_ref().map(|active| &active.handle)
    }

    /// Opens the channel for `project_id`, closing any previous subscription
    /// first. A blank id only tears down and returns `None`.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn subscribe(&mut self, project_id: &str) -> Option<SubscriptionHandle> {
        self.release_active("resubscribe");

        let Some(project_id) = ProjectId::parse(project_id) else {
            debug!(event = "subscribe_skipped", reason = "empty_project_id");
            return None;
        };

        self.next_handle_id += 1;
        let handle = SubscriptionHandle {
            id: self.next_handle_id,
            project_id: project_id.clone(),
        };
        let closed = Arc::new(AtomicBool::new(false));
        let endpoint = self.config.endpoint_for(&project_id);

        self.state
            .send_replace(ChannelState::connecting(project_id.clone()));
        info!(event = "subscribe", project_id = %project_id, endpoint = %endpoint);

        let events = self.transport.open(endpoint.clone());
        let driver = SubscriptionDriver {
            project_id,
            endpoint,
            config: self.config.clone(),
            transport: self.transport.clone(),
            state: self.state.clone(),
            closed: closed.clone(),
        };
        let driver = tokio::spawn(driver.run(events));

        self.active = Some(ActiveSubscription {
            handle: handle.clone(),
            closed,
            driver,
        });
        Some(handle)
    }

    /// Releases the subscription behind `handle`. Stale handles are ignored,
    /// so calling this more than once is harmless.
    pub fn unsubscribe(&mut self, handle: &SubscriptionHandle) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.id == handle.id);
        if !is_active {
            debug!(
                event = "unsubscribe_ignored",
                project_id = %handle.project_id,
                reason = "stale_handle"
            );
            return;
        }
        self.release_active("unsubscribe");
    }

    fn release_active(&mut self, reason: &str) {
        let Some(active) = self.active.take() else {
            return;
        };
        // Raised before the reset; the driver re-checks it under the watch lock.
        active.closed.store(true, Ordering::Release);
        active.driver.abort();
        self.state.send_replace(ChannelState::default());
        info!(
            event = "unsubscribe",
            project_id = %active.handle.project_id,
            reason = reason
        );
    }
}

impl<T: Transport> Drop for ChannelClient<T> {
    fn drop(&mut self) {
        self.release_active("client_dropped");
    }
}

struct SubscriptionDriver<T: Transport> {
    project_id: ProjectId,
    endpoint: Url,
    config: ChannelConfig,
    transport: Arc<T>,
    state: Arc<watch::Sender<ChannelState>>,
    closed: Arc<AtomicBool>,
}

impl<T: Transport> SubscriptionDriver<T> {
    async fn run(self, mut events: mpsc::Receiver<TransportEvent>) {
        let mut attempts: u32 = 0;
        let mut backoff = self.config.reconnect().map(|policy| policy.initial);
        loop {
            let opened = self.pump(&mut events).await;
            drop(events);

            let Some(policy) = self.config.reconnect().copied() else {
                return;
            };
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            if opened {
                attempts = 0;
                backoff = Some(policy.initial);
            }
            attempts += 1;
            if policy
                .max_attempts
                .is_some_and(|max_attempts| attempts > max_attempts)
            {
                warn!(
                    event = "reconnect_exhausted",
                    project_id = %self.project_id,
                    attempts = attempts - 1
                );
                return;
            }
            let delay = backoff.unwrap_or(policy.initial);
            info!(
                event = "reconnect_scheduled",
                project_id = %self.project_id,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64
            );
            tokio::time::sleep(delay).await;
            backoff = Some(policy.next_backoff(delay));

            if !self.set_connection(ConnectionState::Connecting) {
                return;
            }
            events = self.transport.open(self.endpoint.clone());
        }
    }

    /// Feeds one connection's events into the state until it ends.
    /// Returns whether the connection ever opened.
    async fn pump(&self, events: &mut mpsc::Receiver<TransportEvent>) -> bool {
        let mut opened = false;
        while let Some(event) = events.recv().await {
            if self.closed.load(Ordering::Acquire) {
                return opened;
            }
            let terminal = event.is_terminal();
            match event {
                TransportEvent::Opened => {
                    opened = true;
                    info!(event = "channel_connected", project_id = %self.project_id);
                    self.set_connection(ConnectionState::Connected);
                }
                TransportEvent::Frame(raw) => self.apply_frame(&raw),
                TransportEvent::Closed { reason } => {
                    info!(
                        event = "channel_closed",
                        project_id = %self.project_id,
                        reason = reason.as_deref().unwrap_or("")
                    );
                    self.set_connection(ConnectionState::Disconnected);
                }
                TransportEvent::Failed(err) => {
                    warn!(event = "channel_failed", project_id = %self.project_id, error = %err);
                    self.set_connection(ConnectionState::Disconnected);
                }
            }
            if terminal {
                return opened;
            }
        }
        debug!(event = "channel_stream_ended", project_id = %self.project_id);
        self.set_connection(ConnectionState::Disconnected);
        opened
    }

    /// Returns false once the subscription has been released.
    fn set_connection(&self, connection: ConnectionState) -> bool {
        let closed = &self.closed;
        let mut live = true;
        self.state.send_if_modified(|state| {
            if closed.load(Ordering::Acquire) {
                live = false;
                return false;
            }
            if state.connection == connection {
                return false;
            }
            state.connection = connection;
            if connection == ConnectionState::Connected {
                state.connected_once = true;
            }
            true
        });
        live
    }

    fn apply_frame(&self, raw: &str) {
        let closed = &self.closed;
        let max_frame_bytes = self.config.max_frame_bytes();
        let mut outcome = None;
        self.state.send_if_modified(|state| {
            if closed.load(Ordering::Acquire) {
                return false;
            }
            let applied = state.apply_frame(raw, max_frame_bytes);
            let changed = applied.changed_state();
            outcome = Some(applied);
            changed
        });

        match outcome {
            Some(FrameOutcome::AgentsReplaced { count }) => {
                debug!(event = "swarm_status", project_id = %self.project_id, agents = count);
            }
            Some(FrameOutcome::ProjectUpdated { stage }) => {
                debug!(event = "project_update", project_id = %self.project_id, stage = %stage);
            }
            Some(FrameOutcome::CrossProject { project_id }) => {
                debug!(
                    event = "cross_project_update",
                    project_id = %self.project_id,
                    foreign_project_id = %project_id
                );
            }
            Some(FrameOutcome::Rejected(err)) => {
                warn!(event = "frame_rejected", project_id = %self.project_id, error = %err);
            }
            None => {}
        }
    }
}
