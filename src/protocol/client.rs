//! Control channel client.
//!
//! One background task owns the socket. It connects, forwards decoded frames
//! to a single ordered channel, writes queued requests, and reconnects with
//! backoff forever until shut down. Everything else talks to it through a
//! [`ClientHandle`].

use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{Backoff, Failure};
use super::codec::{self, InboundMessage, RequestEnvelope};
use super::connection::ConnectionConfig;
use super::error::{AuthError, ConnectionError, DecodeError, SendError};
use super::token::TokenStore;
use crate::config::{ConnectionSettings, ReconnectConfig};

const OUTBOUND_QUEUE: usize = 32;

/// An open control channel session.
pub struct Connection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Open the control channel described by `config`.
pub async fn connect(config: &ConnectionConfig) -> Result<Connection, ConnectionError> {
    let url = config.url();
    let (socket, _response) =
        connect_async(url.as_str())
            .await
            .map_err(|source| ConnectionError::Open {
                url: config.redacted_url(),
                source,
            })?;
    Ok(Connection { socket })
}

impl Connection {
    pub async fn send(&mut self, envelope: &RequestEnvelope) -> Result<(), SendError> {
        let text = codec::encode(envelope)?;
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| {
                debug!("Socket write failed: {}", e);
                SendError::NotConnected
            })
    }

    /// Next data frame. `Ok(None)` means the peer closed the socket.
    pub async fn next_frame(
        &mut self,
    ) -> Result<Option<Result<InboundMessage, DecodeError>>, ConnectionError> {
        loop {
            let Some(message) = self.socket.next().await else {
                return Ok(None);
            };
            match message? {
                Message::Text(text) => {
                    debug!("Received frame: {}", &*text);
                    return Ok(Some(codec::decode(&text)));
                }
                Message::Binary(data) => return Ok(Some(Err(DecodeError::Binary(data.len())))),
                Message::Close(frame) => {
                    info!("Meeting client closed the control channel: {:?}", frame);
                    return Ok(None);
                }
                // ping/pong are answered by the socket itself
                _ => continue,
            }
        }
    }

    pub async fn close(mut self) {
        if let Err(e) = self.socket.close(None).await {
            debug!("Error while closing control channel: {}", e);
        }
    }
}

/// Request ids that were sent on the current socket and not yet confirmed.
#[derive(Debug, Default)]
pub struct RequestTracker {
    in_flight: HashSet<u64>,
}

impl RequestTracker {
    pub fn register(&mut self, request_id: u64) {
        self.in_flight.insert(request_id);
    }

    /// Returns false when no request with this id is outstanding.
    pub fn complete(&mut self, request_id: u64) -> bool {
        self.in_flight.remove(&request_id)
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Drop everything, returning how many requests were abandoned.
    pub fn reset(&mut self) -> usize {
        let abandoned = self.in_flight.len();
        self.in_flight.clear();
        abandoned
    }
}

/// Cheap, cloneable sender side of the client.
#[derive(Clone)]
pub struct ClientHandle {
    outbound: mpsc::Sender<RequestEnvelope>,
    connected: Arc<AtomicBool>,
    next_request_id: Arc<AtomicU64>,
    api_version: String,
}

impl ClientHandle {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Allocate the next sequential request id.
    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Queue an action such as `toggle-mute`; returns the id used.
    pub async fn send_action(&self, action: &str) -> Result<u64, SendError> {
        let envelope = RequestEnvelope {
            request_id: self.next_request_id(),
            api_version: self.api_version.clone(),
            action: action.to_string(),
        };
        let request_id = envelope.request_id;
        self.send(envelope).await?;
        Ok(request_id)
    }

    pub async fn send(&self, envelope: RequestEnvelope) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }
        self.outbound
            .send(envelope)
            .await
            .map_err(|_| SendError::ClientStopped)
    }
}

enum SessionEnd {
    Shutdown,
    SubscriberGone,
    Closed {
        received_any: bool,
        error: Option<ConnectionError>,
    },
}

pub struct ProtocolClient {
    settings: ConnectionSettings,
    reconnect: ReconnectConfig,
    tokens: TokenStore,
    outbound: mpsc::Receiver<RequestEnvelope>,
    connected: Arc<AtomicBool>,
    requests: RequestTracker,
}

impl ProtocolClient {
    pub fn new(
        settings: ConnectionSettings,
        reconnect: ReconnectConfig,
        tokens: TokenStore,
    ) -> (Self, ClientHandle) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        let handle = ClientHandle {
            outbound: tx,
            connected: connected.clone(),
            next_request_id: Arc::new(AtomicU64::new(1)),
            api_version: settings.protocol_version.clone(),
        };

        let client = Self {
            settings,
            reconnect,
            tokens,
            outbound: rx,
            connected,
            requests: RequestTracker::default(),
        };
        (client, handle)
    }

    /// Connect and keep reconnecting until `shutdown` fires or `events` is dropped.
    ///
    /// Decoded frames are delivered to `events` in arrival order.
    pub async fn run(mut self, events: mpsc::Sender<InboundMessage>, shutdown: CancellationToken) {
        let mut backoff = Backoff::from_config(&self.reconnect);
        let auth_window = Duration::from_millis(self.reconnect.auth_failure_window_ms);
        let stable_after = Duration::from_millis(self.reconnect.stable_after_ms);

        loop {
            // re-read every attempt: a previous session may have refreshed it
            let token = self.tokens.access_token();
            let sent_token = token.is_some();
            let config = ConnectionConfig::from_settings(&self.settings, token);

            info!(
                "Connecting to meeting client at {} (paired: {})",
                config.redacted_url(),
                sent_token
            );

            let attempt = tokio::select! {
                _ = shutdown.cancelled() => break,
                attempt = connect(&config) => attempt,
            };

            let failure = match attempt {
                Err(e) => {
                    warn!("{}", e);
                    Failure::Connection
                }
                Ok(connection) => {
                    info!("Connected to meeting client");
                    if !sent_token {
                        info!("No pairing token stored; approve this device in the meeting client");
                    }

                    let started = Instant::now();
                    self.connected.store(true, Ordering::SeqCst);
                    let end = self.run_session(connection, &events, &shutdown).await;
                    self.connected.store(false, Ordering::SeqCst);

                    let abandoned = self.requests.reset();
                    if abandoned > 0 {
                        warn!("{} request(s) lost with the connection", abandoned);
                    }

                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::SubscriberGone => {
                            info!("Message subscriber dropped, stopping control channel client");
                            break;
                        }
                        SessionEnd::Closed {
                            received_any,
                            error,
                        } => {
                            let uptime = started.elapsed();
                            match error {
                                Some(e) => warn!("Control channel lost after {:?}: {}", uptime, e),
                                None => info!("Control channel closed after {:?}", uptime),
                            }

                            if sent_token && !received_any && uptime < auth_window {
                                warn!("{}; reconnecting without a token", AuthError);
                                if let Err(e) = self.tokens.clear_access_token() {
                                    warn!("Failed to clear rejected token: {}", e);
                                }
                                Failure::Auth
                            } else {
                                if uptime >= stable_after {
                                    backoff.reset();
                                }
                                Failure::Connection
                            }
                        }
                    }
                }
            };

            let delay = backoff.next_delay(failure);
            info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Control channel client stopped");
    }

    async fn run_session(
        &mut self,
        mut connection: Connection,
        events: &mpsc::Sender<InboundMessage>,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let mut received_any = false;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    connection.close().await;
                    return SessionEnd::Shutdown;
                }
                Some(envelope) = self.outbound.recv() => {
                    let request_id = envelope.request_id;
                    match connection.send(&envelope).await {
                        Ok(()) => {
                            debug!("Sent request {} ({})", request_id, envelope.action);
                            self.requests.register(request_id);
                        }
                        Err(SendError::Encode(e)) => {
                            warn!("Dropping request {}: {}", request_id, e);
                        }
                        Err(_) => {
                            return SessionEnd::Closed { received_any, error: None };
                        }
                    }
                }
                frame = connection.next_frame() => {
                    let message = match frame {
                        Ok(Some(Ok(message))) => message,
                        Ok(Some(Err(e))) => {
                            warn!("Dropping malformed frame: {}", e);
                            continue;
                        }
                        Ok(None) => return SessionEnd::Closed { received_any, error: None },
                        Err(e) => return SessionEnd::Closed { received_any, error: Some(e) },
                    };
                    received_any = true;

                    match &message {
                        InboundMessage::Response(response) => {
                            if !self.requests.complete(response.request_id) {
                                warn!(
                                    "Discarding response for unknown request {}",
                                    response.request_id
                                );
                                continue;
                            }
                            debug!(
                                "Request {} confirmed: {}",
                                response.request_id, response.response
                            );
                        }
                        InboundMessage::TokenRefresh(token) => {
                            if let Err(e) = self.tokens.update_access_token(token) {
                                warn!("Failed to persist refreshed token: {}", e);
                            }
                        }
                        InboundMessage::MeetingUpdate(_) => {}
                    }

                    if events.send(message).await.is_err() {
                        connection.close().await;
                        return SessionEnd::SubscriberGone;
                    }
                }
            }
        }
    }
}
