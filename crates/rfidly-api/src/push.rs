//! Push channel client with auto-reconnect.
//!
//! Connects to a Pusher-protocol (v7) service, joins named channels and
//! streams their events through a [`tokio::sync::broadcast`] channel.
//! Handles reconnection with exponential backoff + jitter and re-joins
//! every channel after each reconnect. Events emitted while disconnected
//! are not replayed.
//!
//! # Example
//!
//! ```rust,ignore
//! use rfidly_api::push::{PushConfig, PushHandle};
//! use tokio_util::sync::CancellationToken;
//!
//! let handle = PushHandle::connect(PushConfig::new("app-key", "ap1"), CancellationToken::new())?;
//! handle.join("rfid-scan");
//! let mut rx = handle.events();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}/{}: {}", event.channel, event.event, event.data);
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

const PROTOCOL_VERSION: u8 = 7;

// ── PushEvent ────────────────────────────────────────────────────────

/// An application event received on a joined channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    pub channel: String,
    /// Event name, e.g. `"tag-scanned"`.
    pub event: String,
    /// Decoded payload. Strings that hold JSON are parsed.
    pub data: Value,
}

// ── PushState ────────────────────────────────────────────────────────

/// Connection state, observable for status display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PushState {
    #[default]
    Connecting,
    Connected,
    Disconnected,
    Error(String),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for push-channel reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── PushConfig ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Application key.
    pub key: String,
    /// Hosted cluster, e.g. `ap1`.
    pub cluster: String,
    /// Explicit endpoint (`ws://host:port`) overriding the cluster host.
    pub host: Option<Url>,
    pub reconnect: ReconnectConfig,
}

impl PushConfig {
    pub fn new(key: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cluster: cluster.into(),
            host: None,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Full WebSocket URL for this application.
    pub fn websocket_url(&self) -> Result<Url, Error> {
        let base = match &self.host {
            Some(host) => host.clone(),
            None => Url::parse(&format!("wss://ws-{}.pusher.com", self.cluster))?,
        };
        let mut url = base.join(&format!("app/{}", self.key))?;
        url.query_pairs_mut()
            .append_pair("protocol", &PROTOCOL_VERSION.to_string())
            .append_pair("client", "rfidly")
            .append_pair("version", env!("CARGO_PKG_VERSION"))
            .append_pair("flash", "false");
        Ok(url)
    }
}

// ── PushHandle ───────────────────────────────────────────────────────

enum Command {
    Join(String),
}

#[derive(Default)]
struct Channels(std::sync::Mutex<BTreeSet<String>>);

impl Channels {
    fn insert(&self, name: &str) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned())
    }

    fn snapshot(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Handle to a running push-channel connection.
///
/// Joining is idempotent: a channel is subscribed at most once per
/// connection no matter how many times [`join`](Self::join) is called.
pub struct PushHandle {
    event_rx: broadcast::Receiver<Arc<PushEvent>>,
    state_rx: watch::Receiver<PushState>,
    commands: mpsc::UnboundedSender<Command>,
    channels: Arc<Channels>,
    cancel: CancellationToken,
}

impl PushHandle {
    /// Spawn the reconnection loop.
    ///
    /// Returns immediately; the first connection attempt happens in the
    /// background. Watch [`state`](Self::state) to follow it.
    pub fn connect(config: PushConfig, cancel: CancellationToken) -> Result<Self, Error> {
        let url = config.websocket_url()?;
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(PushState::Connecting);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let channels = Arc::new(Channels::default());

        let shared = Shared {
            event_tx,
            state_tx,
            channels: Arc::clone(&channels),
        };
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            ws_loop(url, shared, command_rx, config.reconnect, task_cancel).await;
        });

        Ok(Self {
            event_rx,
            state_rx,
            commands,
            channels,
            cancel,
        })
    }

    /// Join a channel. Returns `false` if it was already joined.
    pub fn join(&self, channel: &str) -> bool {
        let added = self.channels.insert(channel);
        if added {
            let _ = self.commands.send(Command::Join(channel.to_owned()));
        }
        added
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// If a consumer falls behind, it receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn events(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.event_rx.resubscribe()
    }

    pub fn state(&self) -> watch::Receiver<PushState> {
        self.state_rx.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Background reconnection loop ─────────────────────────────────────

struct Shared {
    event_tx: broadcast::Sender<Arc<PushEvent>>,
    state_tx: watch::Sender<PushState>,
    channels: Arc<Channels>,
}

impl Shared {
    fn set_state(&self, state: PushState) {
        self.state_tx.send_replace(state);
    }
}

/// How a single connection ended without a transport error.
enum Ending {
    /// Close frame or stream end.
    Clean,
    /// Service asked for an immediate reconnect (4200-4299).
    ReconnectNow,
    Cancelled,
}

/// Main loop: connect → read → on error, backoff → reconnect.
async fn ws_loop(
    url: Url,
    shared: Shared,
    mut commands: mpsc::UnboundedReceiver<Command>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(PushState::Connecting);
        let result = connect_and_read(&url, &shared, &mut commands, &cancel, &mut attempt).await;

        match result {
            Ok(Ending::Cancelled) => break,
            Ok(Ending::Clean) => {
                tracing::info!("push channel disconnected cleanly, reconnecting");
                shared.set_state(PushState::Disconnected);
                attempt = 0;
            }
            Ok(Ending::ReconnectNow) => {
                tracing::info!("push service requested reconnect");
                shared.set_state(PushState::Disconnected);
            }
            Err(e) => {
                if let Error::Push {
                    code: Some(code @ 4000..4100),
                    message,
                } = &e
                {
                    tracing::error!(code, %message, "push service refused connection, giving up");
                    shared.set_state(PushState::Error(e.to_string()));
                    break;
                }

                tracing::warn!(error = %e, attempt, "push channel error");
                shared.set_state(PushState::Error(e.to_string()));

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "push reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                tracing::info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }

    if !matches!(*shared.state_tx.borrow(), PushState::Error(_)) {
        shared.set_state(PushState::Disconnected);
    }
    tracing::debug!("push loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

async fn connect_and_read(
    url: &Url,
    shared: &Shared,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> Result<Ending, Error> {
    tracing::info!(url = %url, "connecting to push service");

    let (ws_stream, _response) = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(Ending::Cancelled),
        conn = tokio_tungstenite::connect_async(url.as_str()) => {
            conn.map_err(|e| Error::WebSocketConnect(e.to_string()))?
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let mut established = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(Ending::Cancelled);
            }
            Some(command) = commands.recv(), if established => {
                let Command::Join(channel) = command;
                let frame = subscribe_frame(&channel);
                send_text(&mut write, frame).await?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Ok(Frame::Established { socket_id }) => {
                            tracing::info!(%socket_id, "push connection established");
                            established = true;
                            *attempt = 0;
                            shared.set_state(PushState::Connected);
                            // Joins queued while offline are covered by the snapshot.
                            while commands.try_recv().is_ok() {}
                            for channel in shared.channels.snapshot() {
                                send_text(&mut write, subscribe_frame(&channel)).await?;
                            }
                        }
                        Ok(Frame::Ping) => {
                            send_text(&mut write, json!({"event": "pusher:pong", "data": {}}).to_string()).await?;
                        }
                        Ok(Frame::Pong) => tracing::trace!("push pong"),
                        Ok(Frame::SubscriptionSucceeded { channel }) => {
                            tracing::info!(%channel, "joined push channel");
                        }
                        Ok(Frame::Error { code, message }) => match code {
                            Some(4200..4300) => return Ok(Ending::ReconnectNow),
                            _ => return Err(Error::Push { code, message }),
                        },
                        Ok(Frame::Event(event)) => {
                            tracing::debug!(channel = %event.channel, event = %event.event, "push event");
                            // Send errors just mean no active subscribers.
                            let _ = shared.event_tx.send(Arc::new(event));
                        }
                        Ok(Frame::Internal(name)) => tracing::trace!(%name, "ignoring push frame"),
                        Err(e) => tracing::debug!(error = %e, "failed to parse push frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            let code = u16::from(cf.code);
                            tracing::info!(code, reason = %cf.reason, "push close frame received");
                            match code {
                                4000..4200 => {
                                    return Err(Error::Push {
                                        code: Some(code),
                                        message: cf.reason.to_string(),
                                    });
                                }
                                4200..4300 => return Ok(Ending::ReconnectNow),
                                _ => {}
                            }
                        }
                        return Ok(Ending::Clean);
                    }
                    Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("push stream ended");
                        return Ok(Ending::Clean);
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn send_text<S>(write: &mut S, text: String) -> Result<(), Error>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    write
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| Error::WebSocketClosed {
            code: 1006,
            reason: e.to_string(),
        })
}

fn subscribe_frame(channel: &str) -> String {
    json!({"event": "pusher:subscribe", "data": {"channel": channel}}).to_string()
}

// ── Frame parsing ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, PartialEq)]
enum Frame {
    Established { socket_id: String },
    Ping,
    Pong,
    SubscriptionSucceeded { channel: String },
    Error { code: Option<u16>, message: String },
    Event(PushEvent),
    /// Protocol-internal frame we do not act on.
    Internal(String),
}

/// Payloads arrive JSON-encoded inside a string; decode when possible.
fn decode_data(data: Option<Value>) -> Value {
    match data {
        Some(Value::String(s)) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
        Some(other) => other,
        None => Value::Null,
    }
}

fn parse_frame(text: &str) -> Result<Frame, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(text)?;
    let data = decode_data(raw.data);

    Ok(match raw.event.as_str() {
        "pusher:connection_established" => Frame::Established {
            socket_id: data["socket_id"].as_str().unwrap_or_default().to_owned(),
        },
        "pusher:ping" => Frame::Ping,
        "pusher:pong" => Frame::Pong,
        "pusher:error" => Frame::Error {
            code: data["code"].as_u64().and_then(|c| u16::try_from(c).ok()),
            message: data["message"].as_str().unwrap_or_default().to_owned(),
        },
        "pusher_internal:subscription_succeeded" => Frame::SubscriptionSucceeded {
            channel: raw.channel.unwrap_or_default(),
        },
        name if name.starts_with("pusher:") || name.starts_with("pusher_internal:") => {
            Frame::Internal(name.to_owned())
        }
        _ => match raw.channel {
            Some(channel) => Frame::Event(PushEvent {
                channel,
                event: raw.event,
                data,
            }),
            None => Frame::Internal(raw.event),
        },
    })
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic jitter seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────
