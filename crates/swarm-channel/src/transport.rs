use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

const EVENT_QUEUE_CAPACITY: usize = 256;

/// Connection-level events, delivered in transport order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed { reason: Option<String> },
    Failed(String),
}

impl TransportEvent {
    /// After a terminal event the transport delivers nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportEvent::Closed { .. } | TransportEvent::Failed(_))
    }
}

/// Source of inbound agent-state frames for one endpoint.
///
/// Implementations push events into the returned receiver and must stop
/// (and release the connection) once that receiver is dropped.
pub trait Transport: Send + Sync + 'static {
    fn open(&self, endpoint: Url) -> mpsc::Receiver<TransportEvent>;
}

/// WebSocket event source. `open` must be called from inside a tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl Transport for WebSocketTransport {
    fn open(&self, endpoint: Url) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        tokio::spawn(run_socket(endpoint, tx));
        rx
    }
}

async fn run_socket(endpoint: Url, tx: mpsc::Sender<TransportEvent>) {
    let connect = tokio::select! {
        result = connect_async(endpoint.as_str()) => result,
        _ = tx.closed() => return,
    };
    let (mut ws, _) = match connect {
        Ok(value) => value,
        Err(err) => {
            warn!(event = "channel_connect_error", endpoint = %endpoint, error = %err);
            let _ = tx.send(TransportEvent::Failed(err.to_string())).await;
            return;
        }
    };
    if tx.send(TransportEvent::Opened).await.is_err() {
        let _ = ws.close(None).await;
        return;
    }

    let terminal = loop {
        tokio::select! {
            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if tx.send(TransportEvent::Frame(text)).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => {
                            if tx.send(TransportEvent::Frame(text)).await.is_err() {
                                break None;
                            }
                        }
                        Err(_) => {
                            warn!(event = "binary_frame_rejected", endpoint = %endpoint);
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|frame| frame.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        break Some(TransportEvent::Closed { reason });
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => break Some(TransportEvent::Failed(err.to_string())),
                    None => break Some(TransportEvent::Closed { reason: None }),
                }
            }
            _ = tx.closed() => break None,
        }
    };

    match terminal {
        Some(event) => {
            debug!(event = "channel_socket_ended", endpoint = %endpoint, terminal = ?event);
            let _ = tx.send(event).await;
        }
        None => {
            debug!(event = "channel_socket_released", endpoint = %endpoint);
            let _ = ws.close(None).await;
        }
    }
}
