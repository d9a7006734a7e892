//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect → receive HELLO → send IDENTIFY (or RESUME)
//!   - background heartbeat task
//!   - sequence number + session_id tracking
//!   - reconnect with backoff on disconnect
//!   - gateway send rate limiting (120 events / 60s)
//!   - presence updates (op 3), replayed on the next IDENTIFY
//!
//! The rest of the crate consumes a stream of [`GatewayEvent`] values and
//! publishes presence through [`GatewaySender`]; nothing else touches
//! `tokio_tungstenite`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::poller::PresenceSink;
use crate::types::{ActivityType, GatewayPayload, Intents, UpdatePresence};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: usize = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Consecutive failed connects before the driver gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

const HELLO_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("gateway protocol error: {0}")]
    Protocol(String),
    #[error("gateway payload error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("gateway driver has shut down")]
    Closed,
}

// ---------------------------------------------------------------------------
// Gateway send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window limiter for outbound gateway messages.
struct SendRateLimiter {
    timestamps: Vec<Instant>,
    budget: usize,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: usize, window: Duration) -> Self {
        Self {
            timestamps: Vec::with_capacity(budget),
            budget,
            window,
        }
    }

    /// How long to wait before the next send. Does not record the send.
    fn delay(&self, now: Instant) -> Option<Duration> {
        let in_window: Vec<&Instant> = self
            .timestamps
            .iter()
            .filter(|&&t| now.duration_since(t) < self.window)
            .collect();

        if in_window.len() < self.budget {
            return None;
        }

        let oldest = **in_window.iter().min()?;
        let expires_at = oldest + self.window;
        (expires_at > now).then(|| expires_at - now)
    }

    fn record(&mut self, now: Instant) {
        self.timestamps
            .retain(|&t| now.duration_since(t) < self.window);
        self.timestamps.push(now);
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: Intents,
}

// ---------------------------------------------------------------------------
// Internal session state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
    /// Last presence we published; sent again in IDENTIFY.
    presence: Option<UpdatePresence>,
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Outbound commands accepted by the driver.
#[derive(Debug, Clone)]
enum Outbound {
    Presence(UpdatePresence),
}

/// Cloneable handle for sending on the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySender {
    tx: mpsc::Sender<Outbound>,
}

impl GatewaySender {
    /// Queue a presence update (op 3).
    pub async fn update_presence(&self, presence: UpdatePresence) -> Result<(), GatewayError> {
        self.tx
            .send(Outbound::Presence(presence))
            .await
            .map_err(|_| GatewayError::Closed)
    }
}

#[async_trait]
impl PresenceSink for GatewaySender {
    async fn set_presence(&self, text: &str, kind: ActivityType) -> Result<(), GatewayError> {
        self.update_presence(UpdatePresence::online(text, kind)).await
    }
}

/// A running gateway connection.
pub struct GatewayHandle {
    pub sender: GatewaySender,
    pub events: mpsc::Receiver<GatewayEvent>,
    /// The background driver; finishes when the gateway gives up.
    pub driver: tokio::task::JoinHandle<()>,
}

/// Spawn the gateway driver and return a [`GatewayHandle`].
///
/// The driver keeps reconnecting until a fatal close code, too many failed
/// connects, or the event receiver being dropped.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, event_rx) = mpsc::channel::<GatewayEvent>(256);
    let (send_tx, send_rx) = mpsc::channel::<Outbound>(64);

    let driver = tokio::spawn(gateway_driver(config, event_tx, send_rx));

    GatewayHandle {
        sender: GatewaySender { tx: send_tx },
        events: event_rx,
        driver,
    }
}

// ---------------------------------------------------------------------------
// Driver loop
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Fatal,
    EventChannelClosed,
}

/// Shared per-connection writer state.
struct Writer {
    sink: Mutex<WsSink>,
    limiter: Mutex<SendRateLimiter>,
}

impl Writer {
    async fn send(&self, payload: &Value) -> Result<(), GatewayError> {
        loop {
            let delay = self.limiter.lock().await.delay(Instant::now());
            match delay {
                Some(d) => {
                    debug!(delay_ms = d.as_millis() as u64, "gateway send rate-limited, waiting");
                    tokio::time::sleep(d).await;
                }
                None => break,
            }
        }
        self.limiter.lock().await.record(Instant::now());

        let text = serde_json::to_string(payload)?;
        self.sink.lock().await.send(WsMessage::Text(text)).await?;
        Ok(())
    }
}

async fn gateway_driver(
    config: GatewayConfig,
    event_tx: mpsc::Sender<GatewayEvent>,
    mut send_rx: mpsc::Receiver<Outbound>,
) {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut attempts: u32 = 0;

    loop {
        let url = {
            let s = session.lock().await;
            gateway_url(s.resume_gateway_url.as_deref())
        };

        info!(url = %url, "connecting to Discord gateway");

        let ws_stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!(error = %e, "failed to connect to gateway");
                attempts += 1;
                if attempts > MAX_RECONNECT_ATTEMPTS {
                    error!("exceeded max reconnect attempts, giving up");
                    return;
                }
                sleep_backoff(attempts).await;
                continue;
            }
        };

        let (sink, mut stream) = ws_stream.split();
        let writer = Arc::new(Writer {
            sink: Mutex::new(sink),
            limiter: Mutex::new(SendRateLimiter::new(SEND_BUDGET_MAX, SEND_BUDGET_WINDOW)),
        });

        let heartbeat_interval = match read_hello(&mut stream).await {
            Ok(interval) => interval,
            Err(e) => {
                error!(error = %e, "failed to read HELLO from gateway");
                attempts += 1;
                sleep_backoff(attempts).await;
                continue;
            }
        };
        info!(interval_ms = heartbeat_interval, "received HELLO");

        let opening = {
            let s = session.lock().await;
            opening_payload(&config, &s)
        };
        if let Err(e) = writer.send(&opening).await {
            error!(error = %e, "failed to send IDENTIFY/RESUME");
            attempts += 1;
            sleep_backoff(attempts).await;
            continue;
        }
        info!(op = ?opening["op"], "sent opening payload");
        attempts = 0;

        let heartbeat = tokio::spawn(heartbeat_loop(
            heartbeat_interval,
            Arc::clone(&writer),
            Arc::clone(&session),
        ));

        let reason = read_loop(&mut stream, &writer, &event_tx, &session, &mut send_rx).await;

        heartbeat.abort();
        let _ = writer.sink.lock().await.send(WsMessage::Close(None)).await;

        match reason {
            DisconnectReason::ShouldResume => info!("will attempt RESUME"),
            DisconnectReason::ShouldReidentify => {
                info!("session invalidated, will re-IDENTIFY");
                let mut s = session.lock().await;
                s.session_id = None;
                s.sequence = None;
            }
            DisconnectReason::Fatal => {
                error!("fatal gateway error, shutting down");
                return;
            }
            DisconnectReason::EventChannelClosed => {
                info!("event channel closed, shutting down gateway driver");
                return;
            }
        }

        attempts += 1;
        if attempts > MAX_RECONNECT_ATTEMPTS {
            error!("exceeded max reconnect attempts, giving up");
            return;
        }
        sleep_backoff(attempts).await;
    }
}

async fn heartbeat_loop(interval_ms: u64, writer: Arc<Writer>, session: Arc<Mutex<SessionState>>) {
    // First beat after `interval * jitter`, jitter ∈ [0, 1).
    let jitter = rand::random::<f64>();
    tokio::time::sleep(Duration::from_millis((interval_ms as f64 * jitter) as u64)).await;

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        interval.tick().await;
        let seq = session.lock().await.sequence;
        if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
            warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
            return;
        }
        debug!(seq = ?seq, "sent heartbeat");
    }
}

async fn read_loop(
    stream: &mut WsStream,
    writer: &Writer,
    event_tx: &mpsc::Sender<GatewayEvent>,
    session: &Mutex<SessionState>,
    send_rx: &mut mpsc::Receiver<Outbound>,
) -> DisconnectReason {
    loop {
        tokio::select! {
            biased;

            Some(outbound) = send_rx.recv() => {
                let payload = match outbound {
                    Outbound::Presence(presence) => {
                        let payload = json!({ "op": 3, "d": presence });
                        session.lock().await.presence = Some(presence);
                        payload
                    }
                };
                if let Err(e) = writer.send(&payload).await {
                    warn!(error = %e, "failed to send payload on gateway");
                }
            }

            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket read error");
                        return DisconnectReason::ShouldResume;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return DisconnectReason::ShouldResume;
                    }
                };

                match msg {
                    WsMessage::Text(text) => {
                        let payload: GatewayPayload = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(error = %e, "failed to parse gateway payload");
                                continue;
                            }
                        };

                        if let Some(s) = payload.s {
                            session.lock().await.sequence = Some(s);
                        }

                        let event = GatewayEvent::from_payload(payload);

                        match &event {
                            GatewayEvent::Ready(ready) => {
                                let mut s = session.lock().await;
                                s.session_id = Some(ready.session_id.clone());
                                s.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                                info!(session_id = %ready.session_id, "gateway READY");
                            }
                            GatewayEvent::HeartbeatRequest => {
                                let seq = session.lock().await.sequence;
                                if let Err(e) = writer.send(&json!({ "op": 1, "d": seq })).await {
                                    warn!(error = %e, "failed to send requested heartbeat");
                                }
                                continue;
                            }
                            GatewayEvent::HeartbeatAck => {
                                debug!("heartbeat acknowledged");
                                continue;
                            }
                            GatewayEvent::Reconnect => {
                                info!("gateway requested reconnect (op 7)");
                                return DisconnectReason::ShouldResume;
                            }
                            GatewayEvent::InvalidSession(resumable) => {
                                warn!(resumable, "session invalidated (op 9)");
                                // Discord asks for a 1-5s pause before reconnecting.
                                tokio::time::sleep(Duration::from_secs(2)).await;
                                return if *resumable {
                                    DisconnectReason::ShouldResume
                                } else {
                                    DisconnectReason::ShouldReidentify
                                };
                            }
                            _ => {}
                        }

                        if event_tx.send(event).await.is_err() {
                            return DisconnectReason::EventChannelClosed;
                        }
                    }

                    WsMessage::Close(frame) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        warn!(close_code = ?code, "WebSocket closed by server");
                        return code.map_or(DisconnectReason::ShouldResume, close_code_reason);
                    }

                    // Ping/Pong/Binary are handled by tungstenite or ignored.
                    _ => {}
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resume URL (if any) with the API version and encoding appended.
fn gateway_url(resume_url: Option<&str>) -> String {
    let url = resume_url.unwrap_or(DEFAULT_GATEWAY_URL);
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}/?v=10&encoding=json", url.trim_end_matches('/'))
    }
}

/// RESUME when we hold a session, otherwise IDENTIFY.
fn opening_payload(config: &GatewayConfig, session: &SessionState) -> Value {
    if let (Some(session_id), Some(seq)) = (&session.session_id, session.sequence) {
        return json!({
            "op": 6,
            "d": {
                "token": config.token,
                "session_id": session_id,
                "seq": seq,
            }
        });
    }

    let mut identify = json!({
        "op": 2,
        "d": {
            "token": config.token,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "mcstatus-bot",
                "device": "mcstatus-bot"
            },
            "intents": config.intents.bits(),
        }
    });
    if let Some(ref presence) = session.presence {
        identify["d"]["presence"] = json!(presence);
    }
    identify
}

fn close_code_reason(code: u16) -> DisconnectReason {
    match code {
        // Authentication failed, invalid shard, sharding required,
        // invalid API version, invalid intents, disallowed intents.
        4004 | 4010..=4014 => {
            error!(code, "unrecoverable gateway close code");
            DisconnectReason::Fatal
        }
        // Invalid seq or session timed out.
        4007 | 4009 => DisconnectReason::ShouldReidentify,
        _ => DisconnectReason::ShouldResume,
    }
}

async fn read_hello(stream: &mut WsStream) -> Result<u64, GatewayError> {
    let msg = tokio::time::timeout(HELLO_TIMEOUT, stream.next())
        .await
        .map_err(|_| GatewayError::Protocol("timed out waiting for HELLO".to_string()))?
        .ok_or_else(|| GatewayError::Protocol("stream ended before HELLO".to_string()))??;

    let text = match msg {
        WsMessage::Text(text) => text,
        other => {
            return Err(GatewayError::Protocol(format!(
                "expected text message for HELLO, got {:?}",
                other
            )))
        }
    };
    hello_interval(&serde_json::from_str(&text)?)
}

fn hello_interval(payload: &GatewayPayload) -> Result<u64, GatewayError> {
    if payload.op != 10 {
        return Err(GatewayError::Protocol(format!(
            "expected op 10 (HELLO), got op {}",
            payload.op
        )));
    }
    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .ok_or_else(|| GatewayError::Protocol("HELLO missing heartbeat_interval".to_string()))
}

/// Exponential backoff with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jittered = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jittered.min(60_000.0) as u64)
}

async fn sleep_backoff(attempt: u32) {
    let backoff = backoff_delay(attempt);
    warn!(
        delay_ms = backoff.as_millis() as u64,
        attempt, "backing off before reconnect"
    );
    tokio::time::sleep(backoff).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
