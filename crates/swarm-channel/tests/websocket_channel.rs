use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use swarm_channel::{ChannelClient, ChannelConfig, ChannelState, ConnectionState};
use swarm_core::{
    encode_message, AgentKind, AgentRecord, AgentStatus, ChannelMessage, ProjectStage,
    ProjectUpdate, DEFAULT_MAX_FRAME_BYTES,
};
use tokio::sync::{mpsc, watch};

#[derive(Clone)]
struct ServerConn {
    project_id: String,
    outbound: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
}

impl ServerConn {
    fn push(&self, message: Message) {
        let _ = self.outbound.send(message);
    }

    fn push_text(&self, text: impl Into<String>) {
        self.push(Message::Text(text.into()));
    }

    fn push_message(&self, message: &ChannelMessage) {
        self.push_text(encode_message(message, DEFAULT_MAX_FRAME_BYTES).expect("encode"));
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Default)]
struct TestHub {
    conns: Arc<Mutex<Vec<ServerConn>>>,
}

impl TestHub {
    fn conn(&self, index: usize) -> ServerConn {
        self.conns.lock().unwrap()[index].clone()
    }

    fn count(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    fn live(&self) -> Vec<String> {
        self.conns
            .lock()
            .unwrap()
            .iter()
            .filter(|conn| !conn.is_closed())
            .map(|conn| conn.project_id.clone())
            .collect()
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(project_id): Path<String>,
    State(hub): State<TestHub>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, project_id, hub))
}

async fn serve_socket(socket: WebSocket, project_id: String, hub: TestHub) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    hub.conns.lock().unwrap().push(ServerConn {
        project_id,
        outbound,
        closed: closed.clone(),
    });

    loop {
        tokio::select! {
            Some(out) = rx.recv() => {
                let is_close = matches!(out, Message::Close(_));
                if sink.send(out).await.is_err() || is_close {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    closed.store(true, Ordering::SeqCst);
}

async fn start_hub() -> (SocketAddr, TestHub) {
    let hub = TestHub::default();
    let app = Router::new()
        .route("/ws/agent-swarm/:project_id", get(ws_handler))
        .with_state(hub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test hub");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, hub)
}

fn config_for(addr: SocketAddr) -> ChannelConfig {
    ChannelConfig::parse(&format!("ws://{addr}/ws/agent-swarm")).expect("channel config")
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

async fn wait_state(
    rx: &mut watch::Receiver<ChannelState>,
    predicate: impl FnMut(&ChannelState) -> bool,
) -> ChannelState {
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
        .await
        .expect("state timeout")
        .expect("state channel open")
        .clone()
}

fn agent(id: &str, kind: AgentKind, status: AgentStatus) -> AgentRecord {
    AgentRecord {
        id: id.to_string(),
        kind,
        status,
        current_task: None,
        progress: None,
    }
}

fn update(project_id: &str, stage: ProjectStage, message: &str) -> ChannelMessage {
    ChannelMessage::ProjectUpdate(ProjectUpdate {
        project_id: project_id.to_string(),
        stage,
        message: message.to_string(),
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scenario_over_websocket() {
    let (addr, hub) = start_hub().await;
    let mut client = ChannelClient::new(config_for(addr));
    let mut rx = client.watch();

    let handle = client.subscribe("proj_1").expect("handle");
    wait_state(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    wait_until(|| hub.count() == 1).await;
    let conn = hub.conn(0);
    assert_eq!(conn.project_id, "proj_1");

    conn.push_text(
        r#"{"type":"swarm_status","payload":[{"id":"intake_01","type":"homeowner_intake","status":"processing"}]}"#,
    );
    let state = wait_state(&mut rx, |s| s.agents.len() == 1).await;
    assert_eq!(
        state.agents,
        vec![agent("intake_01", AgentKind::Intake, AgentStatus::Processing)]
    );

    conn.push_message(&update("proj_1", ProjectStage::Scoping, "Scope analysis started"));
    let state = wait_state(&mut rx, |s| s.stage == ProjectStage::Scoping).await;
    assert_eq!(state.last_message, "Scope analysis started");

    conn.push_message(&update("proj_2", ProjectStage::Scoping, "Scope analysis started"));
    conn.push_message(&ChannelMessage::SwarmStatus(vec![agent(
        "intake_01",
        AgentKind::Intake,
        AgentStatus::Idle,
    )]));
    let state = wait_state(&mut rx, |s| {
        s.agents.first().map(|a| a.status) == Some(AgentStatus::Idle)
    })
    .await;
    assert_eq!(state.stage, ProjectStage::Scoping);
    assert_eq!(state.last_message, "Scope analysis started");

    client.unsubscribe(&handle);
    assert_eq!(client.snapshot().connection, ConnectionState::Disconnected);
    client.unsubscribe(&handle);
    assert_eq!(client.snapshot(), ChannelState::default());
    wait_until(|| conn.is_closed()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_projects_closes_previous_socket() {
    let (addr, hub) = start_hub().await;
    let mut client = ChannelClient::new(config_for(addr));
    let mut rx = client.watch();

    client.subscribe("A").expect("handle a");
    wait_state(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    wait_until(|| hub.count() == 1).await;
    let conn_a = hub.conn(0);

    client.subscribe("B").expect("handle b");
    wait_state(&mut rx, |s| {
        s.is_subscribed_to("B") && s.connection == ConnectionState::Connected
    })
    .await;
    wait_until(|| hub.live() == vec!["B".to_string()]).await;
    let conn_b = hub.conn(1);

    conn_a.push_message(&ChannelMessage::SwarmStatus(vec![agent(
        "a_01",
        AgentKind::Scoping,
        AgentStatus::Active,
    )]));
    conn_b.push_message(&ChannelMessage::SwarmStatus(vec![agent(
        "b_01",
        AgentKind::Payment,
        AgentStatus::Waiting,
    )]));
    let state = wait_state(&mut rx, |s| !s.agents.is_empty()).await;
    assert_eq!(state.agents[0].id, "b_01");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.snapshot().agent("a_01").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn server_close_leaves_client_disconnected() {
    let (addr, hub) = start_hub().await;
    let mut client = ChannelClient::new(config_for(addr));
    let mut rx = client.watch();

    client.subscribe("proj_1").expect("handle");
    wait_state(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    wait_until(|| hub.count() == 1).await;

    hub.conn(0).push(Message::Close(None));
    let state = wait_state(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;
    assert!(state.is_subscribed_to("proj_1"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hub.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_endpoint_reports_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let mut client = ChannelClient::new(config_for(addr));
    let mut rx = client.watch();
    client.subscribe("proj_1").expect("handle");
    let state = wait_state(&mut rx, |s| s.connection == ConnectionState::Disconnected).await;
    assert!(state.agents.is_empty());
    assert!(client.active_handle().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_and_binary_frames() {
    let (addr, hub) = start_hub().await;
    let mut client = ChannelClient::new(config_for(addr));
    let mut rx = client.watch();

    client.subscribe("proj_1").expect("handle");
    wait_state(&mut rx, |s| s.connection == ConnectionState::Connected).await;
    wait_until(|| hub.count() == 1).await;
    let conn = hub.conn(0);

    conn.push_text("definitely not json");
    conn.push_text(serde_json::json!({"type": "bogus", "payload": []}).to_string());
    conn.push(Message::Binary(vec![0xff, 0xfe, 0x00]));
    conn.push(Message::Binary(
        serde_json::json!({
            "type": "project_update",
            "payload": {"projectId": "proj_1", "stage": "complete", "message": "Project closed out"}
        })
        .to_string()
        .into_bytes(),
    ));

    let state = wait_state(&mut rx, |s| s.stage == ProjectStage::Complete).await;
    assert_eq!(state.last_message, "Project closed out");
    assert!(state.agents.is_empty());
    assert_eq!(state.connection, ConnectionState::Connected);
    assert!(!conn.is_closed());
}
