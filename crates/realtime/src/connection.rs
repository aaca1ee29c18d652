//! Socket lifecycle: connect, authenticate, detect failure, reconnect.
//!
//! The manager knows nothing about what frames mean. Text frames go straight
//! to the [`EventDispatcher`]; state transitions are published there as
//! [`LifecycleEvent`]s and mirrored on a `watch` channel.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use taskboard_api::{DeviceIdentity, DEVICE_ID_HEADER};
use taskboard_config::RealtimeConfig;

use crate::dispatcher::EventDispatcher;
use crate::error::{ConnectionError, FrameDecodeError};
use crate::events::{LifecycleEvent, RealtimeEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Linear backoff: attempt `n` waits `n * unit`, at most `max_attempts` tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }
}

impl From<&RealtimeConfig> for ReconnectPolicy {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            backoff_unit: config.backoff_unit(),
        }
    }
}

/// Derive the socket endpoint from the Backend API base address: same host,
/// `http`→`ws` / `https`→`wss`, `path` appended to any existing base path.
///
/// ```
/// use taskboard_realtime::socket_endpoint;
/// use url::Url;
///
/// let base = Url::parse("https://api.example.com").unwrap();
/// assert_eq!(socket_endpoint(&base, "/ws").unwrap().as_str(), "wss://api.example.com/ws");
/// ```
pub fn socket_endpoint(base: &Url, path: &str) -> Result<Url, ConnectionError> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ConnectionError::invalid_endpoint(
                base.as_str(),
                format!("unsupported scheme {other}"),
            ))
        }
    };

    let mut endpoint = base.clone();
    endpoint
        .set_scheme(scheme)
        .map_err(|_| ConnectionError::invalid_endpoint(base.as_str(), "scheme cannot be upgraded"))?;
    let joined = format!(
        "{}/{}",
        endpoint.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    endpoint.set_path(&joined);
    endpoint.set_query(None);
    endpoint.set_fragment(None);
    Ok(endpoint)
}

struct Session {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

enum SessionEnd {
    Shutdown,
    Closed,
}

struct Inner {
    endpoint: Url,
    device_header: HeaderValue,
    handshake_timeout: Duration,
    policy: ReconnectPolicy,
    dispatcher: Arc<EventDispatcher>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    session: Mutex<Option<Session>>,
}

/// Owner of the one socket this process keeps open to the backend.
///
/// Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        config: &RealtimeConfig,
        api_base: &Url,
        identity: &DeviceIdentity,
        dispatcher: Arc<EventDispatcher>,
    ) -> Result<Self, ConnectionError> {
        let endpoint = socket_endpoint(api_base, &config.path)?;
        let device_header =
            HeaderValue::from_str(identity.as_str()).map_err(|_| ConnectionError::InvalidCredential)?;
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            inner: Arc::new(Inner {
                endpoint,
                device_header,
                handshake_timeout: config.handshake_timeout(),
                policy: ReconnectPolicy::from(config),
                dispatcher,
                state,
                attempts: AtomicU32::new(0),
                session: Mutex::new(None),
            }),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Acquire)
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    /// Open the socket. A no-op while already connected or while a connect or
    /// reconnect is in progress.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let claimed = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(state = ?self.state(), "connect ignored");
            return Ok(());
        }

        info!(endpoint = %self.inner.endpoint, "connecting");
        let stream = match self.inner.open().await {
            Ok(stream) => stream,
            Err(error) => {
                self.inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                warn!(%error, "connect failed");
                return Err(error);
            }
        };

        {
            let mut session = self.inner.session.lock();
            if !self
                .inner
                .transition(ConnectionState::Connecting, ConnectionState::Connected)
            {
                debug!("disconnect requested during handshake");
                return Err(ConnectionError::Aborted);
            }
            self.inner.attempts.store(0, Ordering::Release);
            let (shutdown, shutdown_rx) = watch::channel(false);
            let task = tokio::spawn(run_session(self.inner.clone(), stream, shutdown_rx));
            *session = Some(Session { shutdown, task });
        }

        info!("connected");
        self.inner.publish(LifecycleEvent::Connected);
        Ok(())
    }

    /// Close the socket, stop any pending reconnect, reset the attempt
    /// counter, and tear down every dispatcher subscription. `Disconnected`
    /// is published only when the state actually changes.
    pub async fn disconnect(&self) {
        let (previous, session) = {
            let mut session = self.inner.session.lock();
            let previous = self.inner.state.send_replace(ConnectionState::Disconnected);
            (previous, session.take())
        };
        self.inner.attempts.store(0, Ordering::Release);

        if let Some(session) = session {
            let _ = session.shutdown.send(true);
            if let Err(error) = session.task.await {
                warn!(%error, "socket task ended abnormally");
            }
        }

        if previous != ConnectionState::Disconnected {
            self.inner.publish(LifecycleEvent::Disconnected);
        }
        self.inner.dispatcher.clear();
        info!("disconnected");
    }
}

impl Inner {
    async fn open(&self) -> Result<WsStream, ConnectionError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert(HeaderName::from_static(DEVICE_ID_HEADER), self.device_header.clone());

        let (stream, response) = tokio::time::timeout(self.handshake_timeout, connect_async(request))
            .await
            .map_err(|_| ConnectionError::Timeout {
                after: self.handshake_timeout,
            })??;
        debug!(status = %response.status(), "socket handshake complete");
        Ok(stream)
    }

    /// Move `from` → `to`; false when the state was something else.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    fn publish(&self, event: LifecycleEvent) {
        self.dispatcher.publish(&RealtimeEvent::Lifecycle(event));
    }

    /// Read frames until the socket closes or a shutdown is requested.
    async fn pump(&self, stream: &mut WsStream, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        loop {
            if *shutdown.borrow() {
                let _ = stream.close(None).await;
                return SessionEnd::Shutdown;
            }

            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = stream.close(None).await;
                    return SessionEnd::Shutdown;
                }
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.dispatcher.dispatch(&text);
                    }
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        let error = FrameDecodeError::Binary { len: bytes.len() };
                        warn!(%error, "dropping frame");
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        info!(?frame, "socket closed by server");
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(%error, "socket error");
                        return SessionEnd::Closed;
                    }
                    None => {
                        info!("socket stream ended");
                        return SessionEnd::Closed;
                    }
                }
            }
        }
    }

    /// Retry with linear backoff. `None` once attempts are exhausted or a
    /// disconnect interrupts.
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<WsStream> {
        loop {
            let attempt = self.attempts.load(Ordering::Acquire) + 1;
            if attempt > self.policy.max_attempts {
                if self.transition(ConnectionState::Reconnecting, ConnectionState::Disconnected)
                    || self.transition(ConnectionState::Connected, ConnectionState::Disconnected)
                {
                    error!(attempts = self.policy.max_attempts, "giving up on reconnecting");
                    self.publish(LifecycleEvent::ConnectionLost {
                        attempts: self.policy.max_attempts,
                    });
                }
                return None;
            }

            if !self.transition(ConnectionState::Connected, ConnectionState::Reconnecting)
                && *self.state.borrow() != ConnectionState::Reconnecting
            {
                return None;
            }
            self.attempts.store(attempt, Ordering::Release);

            let delay = self.policy.delay_for(attempt);
            info!(attempt, max = self.policy.max_attempts, ?delay, "scheduling reconnect");
            self.publish(LifecycleEvent::Reconnecting { attempt, delay });

            tokio::select! {
                _ = shutdown.changed() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = shutdown.changed() => return None,
                result = self.open() => result,
            };

            match result {
                Ok(mut stream) => {
                    if !self.transition(ConnectionState::Reconnecting, ConnectionState::Connected) {
                        let _ = stream.close(None).await;
                        return None;
                    }
                    self.attempts.store(0, Ordering::Release);
                    info!(attempt, "reconnected");
                    self.publish(LifecycleEvent::Connected);
                    return Some(stream);
                }
                Err(error) => {
                    warn!(attempt, %error, "reconnect attempt failed");
                }
            }
        }
    }
}

async fn run_session(inner: Arc<Inner>, mut stream: WsStream, mut shutdown: watch::Receiver<bool>) {
    loop {
        match inner.pump(&mut stream, &mut shutdown).await {
            SessionEnd::Shutdown => return,
            SessionEnd::Closed => {}
        }

        match inner.reconnect(&mut shutdown).await {
            Some(next) => stream = next,
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(url: &str) -> Url {
        Url::parse(url).unwrap()
    }

    #[test]
    fn endpoint_upgrades_http_schemes() {
        assert_eq!(
            socket_endpoint(&base("http://localhost:8080"), "/ws").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
        assert_eq!(
            socket_endpoint(&base("https://api.example.com/"), "ws").unwrap().as_str(),
            "wss://api.example.com/ws"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_and_drops_query() {
        let endpoint = socket_endpoint(&base("https://example.com/backend/?debug=1"), "/ws").unwrap();
        assert_eq!(endpoint.as_str(), "wss://example.com/backend/ws");
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        let error = socket_endpoint(&base("ftp://example.com"), "/ws").unwrap_err();
        assert!(matches!(error, ConnectionError::InvalidEndpoint { .. }));
    }

    #[test]
    fn backoff_is_linear_in_attempt_number() {
        let policy = ReconnectPolicy {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(3));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
    }

    #[test]
    fn new_manager_starts_disconnected() {
        let manager = ConnectionManager::new(
            &RealtimeConfig::default(),
            &base("http://localhost:8080"),
            &DeviceIdentity::new("device_1_abc"),
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.reconnect_attempts(), 0);
        assert_eq!(manager.endpoint().as_str(), "ws://localhost:8080/ws");
    }

    #[test]
    fn device_id_must_be_a_valid_header() {
        let result = ConnectionManager::new(
            &RealtimeConfig::default(),
            &base("http://localhost:8080"),
            &DeviceIdentity::new("bad\nid"),
            Arc::new(EventDispatcher::new()),
        );
        assert!(matches!(result, Err(ConnectionError::InvalidCredential)));
    }
}
