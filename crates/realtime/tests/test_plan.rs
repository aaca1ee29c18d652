use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::SinkExt;
use serde_json::json;
use taskboard_api::DeviceIdentity;
use taskboard_config::RealtimeConfig;
use taskboard_realtime::{
    ConnectionError, ConnectionManager, ConnectionState, EventCategory, EventDispatcher, HandlerError,
    LifecycleEvent, RealtimeEvent,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use url::Url;

const DEVICE_ID: &str = "device_1700000000000_abc123xyz";
const WAIT: Duration = Duration::from_secs(5);

struct Accepted {
    device_id: Option<String>,
    socket: WebSocketStream<TcpStream>,
}

struct TestServer {
    addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<Accepted>,
    accept_task: JoinHandle<()>,
    silent: Arc<AtomicBool>,
    held: Arc<Mutex<Vec<TcpStream>>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();
        let silent = Arc::new(AtomicBool::new(false));
        let held = Arc::new(Mutex::new(Vec::new()));

        let accept_silent = silent.clone();
        let accept_held = held.clone();
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if accept_silent.load(Ordering::SeqCst) {
                    // Keep the TCP connection open but never answer the upgrade.
                    accept_held.lock().unwrap().push(stream);
                    continue;
                }
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut device_id = None;
                    let callback = |request: &Request, response: Response| {
                        device_id = request
                            .headers()
                            .get("x-device-id")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned);
                        Ok::<_, ErrorResponse>(response)
                    };
                    if let Ok(socket) = accept_hdr_async(stream, callback).await {
                        let _ = tx.send(Accepted { device_id, socket });
                    }
                });
            }
        });

        Self {
            addr,
            connections,
            accept_task,
            silent,
            held,
        }
    }

    /// Accept TCP connections from now on without completing any handshake.
    fn go_silent(&self) {
        self.silent.store(true, Ordering::SeqCst);
    }

    fn held_connections(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    async fn next_connection(&mut self) -> Accepted {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("accept loop stopped")
    }

    /// Stop accepting; later connection attempts are refused.
    async fn stop_accepting(&mut self) {
        self.accept_task.abort();
        let _ = (&mut self.accept_task).await;
    }
}

fn fast_config() -> RealtimeConfig {
    RealtimeConfig {
        path: "/ws".to_string(),
        max_reconnect_attempts: 5,
        backoff_unit_ms: 10,
        handshake_timeout_ms: 100,
    }
}

fn manager_for(base: &Url) -> (ConnectionManager, Arc<EventDispatcher>) {
    let dispatcher = Arc::new(EventDispatcher::new());
    let manager = ConnectionManager::new(
        &fast_config(),
        base,
        &DeviceIdentity::new(DEVICE_ID),
        dispatcher.clone(),
    )
    .unwrap();
    (manager, dispatcher)
}

fn record(dispatcher: &EventDispatcher, category: EventCategory) -> mpsc::UnboundedReceiver<RealtimeEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    dispatcher.subscribe(category, move |event| -> Result<(), HandlerError> {
        let _ = tx.send(event.clone());
        Ok(())
    });
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<RealtimeEvent>) -> RealtimeEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("handler dropped")
}

fn task_frame(id: &str) -> String {
    json!({
        "type": "task_update",
        "payload": {
            "id": id,
            "owner_id": "owner-1",
            "title": "Walk the dog",
            "description": "Twice round the park",
            "reward_amount": 25.5,
            "max_claimants": 2,
            "claim_deadline": "2030-01-01T00:00:00Z",
            "owner_deadline": "2030-01-02T00:00:00Z",
            "status": "open",
            "escrow_locked": false,
            "created_at": "2029-12-01T00:00:00Z",
            "updated_at": "2029-12-01T00:00:00Z"
        }
    })
    .to_string()
}

#[tokio::test]
async fn handshake_carries_device_id() {
    let mut server = TestServer::start().await;
    let (manager, _dispatcher) = manager_for(&server.base_url());

    manager.connect().await.unwrap();
    let accepted = server.next_connection().await;

    assert_eq!(accepted.device_id.as_deref(), Some(DEVICE_ID));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

#[tokio::test]
async fn pushed_frames_reach_category_subscribers() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut tasks = record(&dispatcher, EventCategory::TaskUpdate);
    let mut chats = record(&dispatcher, EventCategory::ChatMessage);

    manager.connect().await.unwrap();
    let mut accepted = server.next_connection().await;
    accepted.socket.send(Message::Text(task_frame("task-1"))).await.unwrap();

    match next_event(&mut tasks).await {
        RealtimeEvent::TaskUpdate(task) => {
            assert_eq!(task.id, "task-1");
            assert_eq!(task.reward_amount, 25.5);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(chats.try_recv().is_err());

    manager.disconnect().await;
}

#[tokio::test]
async fn malformed_and_unknown_frames_do_not_stop_the_stream() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut tasks = record(&dispatcher, EventCategory::TaskUpdate);

    manager.connect().await.unwrap();
    let mut accepted = server.next_connection().await;
    for frame in [
        "{broken".to_string(),
        json!({ "type": "user_typing", "payload": {} }).to_string(),
        json!({ "type": "task_update", "payload": { "id": 1 } }).to_string(),
        task_frame("task-2"),
    ] {
        accepted.socket.send(Message::Text(frame)).await.unwrap();
    }

    assert_eq!(next_event(&mut tasks).await.entity_id(), Some("task-2"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(tasks.try_recv().is_err());
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

#[tokio::test]
async fn connect_while_connected_is_a_no_op() {
    let mut server = TestServer::start().await;
    let (manager, _dispatcher) = manager_for(&server.base_url());

    manager.connect().await.unwrap();
    let _first = server.next_connection().await;
    manager.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.connections.try_recv().is_err());

    manager.disconnect().await;
}

#[tokio::test]
async fn dropped_socket_is_reestablished() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);
    let mut tasks = record(&dispatcher, EventCategory::TaskUpdate);

    manager.connect().await.unwrap();
    assert_eq!(
        next_event(&mut lifecycle).await,
        RealtimeEvent::Lifecycle(LifecycleEvent::Connected)
    );

    let first = server.next_connection().await;
    drop(first);

    assert_eq!(
        next_event(&mut lifecycle).await,
        RealtimeEvent::Lifecycle(LifecycleEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(10),
        })
    );
    let mut second = server.next_connection().await;
    assert_eq!(second.device_id.as_deref(), Some(DEVICE_ID));
    assert_eq!(
        next_event(&mut lifecycle).await,
        RealtimeEvent::Lifecycle(LifecycleEvent::Connected)
    );
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(manager.reconnect_attempts(), 0);

    // Subscriptions survive the reconnect.
    second.socket.send(Message::Text(task_frame("task-3"))).await.unwrap();
    assert_eq!(next_event(&mut tasks).await.entity_id(), Some("task-3"));

    manager.disconnect().await;
}

#[tokio::test]
async fn exhausted_reconnects_surface_exactly_one_connection_lost() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);

    manager.connect().await.unwrap();
    let accepted = server.next_connection().await;
    server.stop_accepting().await;
    drop(accepted);

    let mut attempts = Vec::new();
    loop {
        match next_event(&mut lifecycle).await {
            RealtimeEvent::Lifecycle(LifecycleEvent::Connected) => {}
            RealtimeEvent::Lifecycle(LifecycleEvent::Reconnecting { attempt, delay }) => {
                assert_eq!(delay, Duration::from_millis(10) * attempt);
                attempts.push(attempt);
            }
            RealtimeEvent::Lifecycle(LifecycleEvent::ConnectionLost { attempts: max }) => {
                assert_eq!(max, 5);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(lifecycle.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_stops_reconnecting_and_clears_subscriptions() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);
    let _tasks = record(&dispatcher, EventCategory::TaskUpdate);

    manager.connect().await.unwrap();
    let _accepted = server.next_connection().await;
    manager.disconnect().await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(manager.reconnect_attempts(), 0);
    assert_eq!(dispatcher.handler_count(EventCategory::TaskUpdate), 0);
    assert_eq!(dispatcher.handler_count(EventCategory::Lifecycle), 0);

    let mut seen = Vec::new();
    while let Ok(event) = lifecycle.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            RealtimeEvent::Lifecycle(LifecycleEvent::Connected),
            RealtimeEvent::Lifecycle(LifecycleEvent::Disconnected),
        ]
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.connections.try_recv().is_err());
}

#[tokio::test]
async fn unreachable_server_fails_connect_and_returns_to_disconnected() {
    let mut server = TestServer::start().await;
    let base = server.base_url();
    server.stop_accepting().await;
    let (manager, _dispatcher) = manager_for(&base);

    let error = manager.connect().await.unwrap_err();

    assert!(matches!(error, ConnectionError::Handshake(_)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_after_disconnect_starts_fresh() {
    let mut server = TestServer::start().await;
    let (manager, _dispatcher) = manager_for(&server.base_url());

    manager.connect().await.unwrap();
    let _first = server.next_connection().await;
    manager.disconnect().await;

    manager.connect().await.unwrap();
    let second = server.next_connection().await;

    assert_eq!(second.device_id.as_deref(), Some(DEVICE_ID));
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.disconnect().await;
}

#[tokio::test]
async fn silent_server_times_out_the_handshake() {
    let server = TestServer::start().await;
    server.go_silent();
    let (manager, _dispatcher) = manager_for(&server.base_url());

    let result = timeout(WAIT, manager.connect())
        .await
        .expect("connect must finish once the handshake timeout elapses");

    match result {
        Err(ConnectionError::Timeout { after }) => assert_eq!(after, Duration::from_millis(100)),
        other => panic!("expected a handshake timeout, got {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(server.held_connections(), 1);
}

#[tokio::test]
async fn stalled_reconnects_still_reach_connection_lost() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);

    manager.connect().await.unwrap();
    let accepted = server.next_connection().await;
    server.go_silent();
    drop(accepted);

    let mut reconnecting = 0;
    loop {
        match next_event(&mut lifecycle).await {
            RealtimeEvent::Lifecycle(LifecycleEvent::Connected) => {}
            RealtimeEvent::Lifecycle(LifecycleEvent::Reconnecting { .. }) => reconnecting += 1,
            RealtimeEvent::Lifecycle(LifecycleEvent::ConnectionLost { attempts }) => {
                assert_eq!(attempts, 5);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(reconnecting, 5);
    assert_eq!(server.held_connections(), 5);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_announces_only_real_transitions() {
    let mut server = TestServer::start().await;
    let (manager, dispatcher) = manager_for(&server.base_url());
    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);

    // Never connected: nothing to announce.
    manager.disconnect().await;
    assert!(lifecycle.try_recv().is_err());

    let mut lifecycle = record(&dispatcher, EventCategory::Lifecycle);
    manager.connect().await.unwrap();
    let accepted = server.next_connection().await;
    server.stop_accepting().await;
    drop(accepted);

    loop {
        if let RealtimeEvent::Lifecycle(LifecycleEvent::ConnectionLost { .. }) =
            next_event(&mut lifecycle).await
        {
            break;
        }
    }

    // Already torn down after exhausting reconnects.
    manager.disconnect().await;
    assert!(lifecycle.try_recv().is_err());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}
