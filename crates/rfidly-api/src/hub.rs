//! Device hub control connection.
//!
//! Speaks the JSON hub protocol (records terminated by `0x1E`) over a
//! WebSocket: optional negotiation, handshake, client invocations awaiting
//! completions, and server-pushed notifications fanned out through a
//! [`tokio::sync::broadcast`] channel.
//!
//! ```rust,ignore
//! let hub = HubConnection::new(HubConfig::new(Url::parse("http://localhost:8080/deviceHub")?))?;
//! let mut events = hub.subscribe();
//! hub.start().await?;
//! hub.invoke("GetDevices", vec!["ZL".into(), 10.into()]).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

const RECORD_SEPARATOR: char = '\u{1e}';
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Config ───────────────────────────────────────────────────────────

/// Connection settings for the device hub.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Hub endpoint, e.g. `http://localhost:8080/deviceHub`.
    pub url: Url,
    /// Connect the WebSocket directly without the negotiate round trip.
    pub skip_negotiation: bool,
    /// How long an invocation may wait for its completion.
    pub invoke_timeout: Duration,
    /// Interval between keep-alive pings.
    pub keepalive_interval: Duration,
    pub transport: TransportConfig,
}

impl HubConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            skip_negotiation: false,
            invoke_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(15),
            transport: TransportConfig::default(),
        }
    }
}

// ── Events ───────────────────────────────────────────────────────────

/// Something the hub pushed to us.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEvent {
    /// Server-to-client method call, e.g. `OnAttempts(3)` or `TagRead({...})`.
    Notification { target: String, arguments: Vec<Value> },
    /// The connection ended. `error` is `None` for a local stop.
    Closed { error: Option<String> },
}

// ── Wire messages ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
    },
    /// Streaming items, acks and anything else we do not act on.
    Other(u8),
}

/// Split a text frame into records and decode each one.
pub(crate) fn parse_records(text: &str) -> Vec<Result<HubMessage, Error>> {
    text.split(RECORD_SEPARATOR)
        .filter(|r| !r.trim().is_empty())
        .map(parse_record)
        .collect()
}

fn parse_record(record: &str) -> Result<HubMessage, Error> {
    let raw: RawMessage = serde_json::from_str(record).map_err(|e| Error::Deserialization {
        message: format!("hub record: {e}"),
        body: record.to_owned(),
    })?;

    Ok(match raw.kind {
        1 => HubMessage::Invocation {
            invocation_id: raw.invocation_id,
            target: raw.target.unwrap_or_default(),
            arguments: raw.arguments,
        },
        3 => HubMessage::Completion {
            invocation_id: raw.invocation_id.unwrap_or_default(),
            result: raw.result,
            error: raw.error,
        },
        6 => HubMessage::Ping,
        7 => HubMessage::Close { error: raw.error },
        other => HubMessage::Other(other),
    })
}

pub(crate) fn encode(value: &Value) -> String {
    format!("{value}{RECORD_SEPARATOR}")
}

fn invocation_frame(invocation_id: &str, method: &str, args: &[Value]) -> String {
    encode(&json!({
        "type": 1,
        "invocationId": invocation_id,
        "target": method,
        "arguments": args,
    }))
}

// ── Pending invocations ──────────────────────────────────────────────

struct Pending {
    method: String,
    reply: oneshot::Sender<Result<Value, Error>>,
}

#[derive(Default, Clone)]
struct PendingMap(Arc<std::sync::Mutex<HashMap<String, Pending>>>);

impl PendingMap {
    fn insert(&self, id: String, pending: Pending) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, pending);
    }

    fn remove(&self, id: &str) -> Option<Pending> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Fail everything still waiting: the socket is gone.
    fn fail_all(&self) {
        let drained: Vec<Pending> = self
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, p)| p)
            .collect();
        for pending in drained {
            debug!(method = %pending.method, "failing pending invocation");
            let _ = pending.reply.send(Err(Error::HubClosed));
        }
    }
}

// ── HubConnection ────────────────────────────────────────────────────

struct Live {
    outgoing: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Live {
    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.outgoing.is_closed()
    }
}

/// A (re)startable control connection to the device hub.
///
/// `start` is idempotent, `stop` is safe in any state. Notifications are
/// delivered to every [`subscribe`](Self::subscribe)r in arrival order.
pub struct HubConnection {
    config: HubConfig,
    http: reqwest::Client,
    events: broadcast::Sender<HubEvent>,
    pending: PendingMap,
    live: Mutex<Option<Live>>,
    next_id: AtomicU64,
}

impl HubConnection {
    pub fn new(config: HubConfig) -> Result<Self, Error> {
        let http = config.transport.build_client()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            http,
            events,
            pending: PendingMap::default(),
            live: Mutex::new(None),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Receive notifications and close events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.events.subscribe()
    }

    pub async fn is_open(&self) -> bool {
        self.live.lock().await.as_ref().is_some_and(Live::is_open)
    }

    /// Open the connection and complete the handshake. No-op when already open.
    pub async fn start(&self) -> Result<(), Error> {
        let mut live = self.live.lock().await;
        if live.as_ref().is_some_and(Live::is_open) {
            return Ok(());
        }
        // Reap a connection that dropped on its own.
        if let Some(stale) = live.take() {
            stale.cancel.cancel();
            let _ = stale.task.await;
        }

        let ws_url = self.websocket_url().await?;
        info!(url = %ws_url, "connecting to device hub");

        let (mut ws, _response) = tokio_tungstenite::connect_async(ws_url.as_str())
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let leftover = tokio::time::timeout(self.config.invoke_timeout, handshake(&mut ws))
            .await
            .map_err(|_| Error::Timeout {
                timeout_secs: self.config.invoke_timeout.as_secs(),
            })??;
        info!("device hub handshake complete");

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(
            ws,
            outgoing_rx,
            Dispatcher {
                pending: self.pending.clone(),
                events: self.events.clone(),
            },
            cancel.clone(),
            self.config.keepalive_interval,
            leftover,
        ));

        *live = Some(Live {
            outgoing,
            cancel,
            task,
        });
        Ok(())
    }

    /// Invoke a hub method and wait for its completion.
    pub async fn invoke(&self, method: &str, args: Vec<Value>) -> Result<Value, Error> {
        self.invoke_with_timeout(method, args, self.config.invoke_timeout)
            .await
    }

    pub async fn invoke_with_timeout(
        &self,
        method: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let outgoing = {
            let live = self.live.lock().await;
            live.as_ref()
                .filter(|l| l.is_open())
                .map(|l| l.outgoing.clone())
                .ok_or(Error::HubClosed)?
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (reply, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            Pending {
                method: method.to_owned(),
                reply,
            },
        );

        debug!(method, invocation_id = %id, "hub invoke");
        if outgoing.send(invocation_frame(&id, method, &args)).is_err() {
            self.pending.remove(&id);
            return Err(Error::HubClosed);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::HubClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::Timeout {
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    /// Close the connection. Safe to call in any state.
    pub async fn stop(&self) {
        let Some(live) = self.live.lock().await.take() else {
            return;
        };
        debug!("stopping device hub connection");
        live.cancel.cancel();
        if let Err(e) = live.task.await {
            warn!(error = %e, "hub connection task ended abnormally");
        }
    }

    // ── Negotiation ──────────────────────────────────────────────────

    async fn websocket_url(&self) -> Result<Url, Error> {
        let mut url = self.config.url.clone();

        if !self.config.skip_negotiation {
            let token = self.negotiate().await?;
            url.query_pairs_mut().append_pair("id", &token);
        }

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::Hub {
                message: format!("cannot use {} as a WebSocket URL", self.config.url),
            })?;
        Ok(url)
    }

    async fn negotiate(&self) -> Result<String, Error> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Negotiation {
            #[serde(default)]
            connection_id: Option<String>,
            #[serde(default)]
            connection_token: Option<String>,
            #[serde(default)]
            error: Option<String>,
        }

        let mut url = self.config.url.clone();
        let path = format!("{}/negotiate", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut().append_pair("negotiateVersion", "1");
        debug!("POST {url}");

        let resp = self.http.post(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let negotiation: Negotiation = resp.json().await?;
        if let Some(error) = negotiation.error {
            return Err(Error::Hub { message: error });
        }
        negotiation
            .connection_token
            .or(negotiation.connection_id)
            .ok_or_else(|| Error::Hub {
                message: "negotiate response carried no connection token".into(),
            })
    }
}

// ── Handshake ────────────────────────────────────────────────────────

/// Send the protocol handshake and wait for its acknowledgement.
///
/// Returns any messages that arrived in the same frame after the ack.
async fn handshake<S>(ws: &mut WebSocketStream<S>) -> Result<Vec<HubMessage>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    ws.send(Message::Text(
        encode(&json!({"protocol": "json", "version": 1})).into(),
    ))
    .await
    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    loop {
        let frame = ws
            .next()
            .await
            .ok_or(Error::WebSocketClosed {
                code: 1006,
                reason: "closed during handshake".into(),
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        let Message::Text(text) = frame else { continue };
        let mut records = text.split(RECORD_SEPARATOR).filter(|r| !r.trim().is_empty());
        let Some(ack) = records.next() else { continue };

        let ack: Value = serde_json::from_str(ack).map_err(|e| Error::Hub {
            message: format!("malformed handshake response: {e}"),
        })?;
        if let Some(error) = ack.get("error").and_then(Value::as_str) {
            return Err(Error::Hub {
                message: format!("handshake rejected: {error}"),
            });
        }

        return records.map(parse_record).collect();
    }
}

// ── Connection task ──────────────────────────────────────────────────

struct Dispatcher {
    pending: PendingMap,
    events: broadcast::Sender<HubEvent>,
}

impl Dispatcher {
    /// Route one decoded message. Returns `Some` when the server closed us.
    fn dispatch(&self, message: HubMessage) -> Option<Option<String>> {
        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => {
                trace!(%target, "hub notification");
                let _ = self.events.send(HubEvent::Notification { target, arguments });
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => match self.pending.remove(&invocation_id) {
                Some(pending) => {
                    let outcome = match error {
                        Some(message) => Err(Error::Invocation {
                            method: pending.method,
                            message,
                        }),
                        None => Ok(result.unwrap_or(Value::Null)),
                    };
                    let _ = pending.reply.send(outcome);
                }
                None => debug!(%invocation_id, "completion for unknown invocation"),
            },
            HubMessage::Ping => trace!("hub ping"),
            HubMessage::Close { error } => return Some(error),
            HubMessage::Other(kind) => trace!(kind, "ignoring hub message"),
        }
        None
    }

    fn finish(&self, error: Option<String>) {
        self.pending.fail_all();
        let _ = self.events.send(HubEvent::Closed { error });
    }
}

/// Own the socket: write queued frames, keep alive, read and dispatch.
async fn drive<S>(
    ws: WebSocketStream<S>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    dispatcher: Dispatcher,
    cancel: CancellationToken,
    keepalive: Duration,
    leftover: Vec<HubMessage>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();

    for message in leftover {
        if let Some(error) = dispatcher.dispatch(message) {
            dispatcher.finish(error);
            return;
        }
    }

    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);
    let ping_frame = encode(&json!({"type": 6}));

    let close_error: Option<String> = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break None;
            }
            Some(frame) = outgoing.recv() => {
                if let Err(e) = write.send(Message::Text(frame.into())).await {
                    break Some(e.to_string());
                }
            }
            _ = ping.tick() => {
                if let Err(e) = write.send(Message::Text(ping_frame.clone().into())).await {
                    break Some(e.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let mut closed = None;
                    for parsed in parse_records(&text) {
                        match parsed {
                            Ok(message) => {
                                if let Some(error) = dispatcher.dispatch(message) {
                                    closed = Some(error);
                                    break;
                                }
                            }
                            Err(e) => debug!(error = %e, "skipping malformed hub record"),
                        }
                    }
                    if let Some(error) = closed {
                        info!(error = ?error, "device hub closed the connection");
                        break error;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .filter(|cf| u16::from(cf.code) != 1000)
                        .map(|cf| format!("closed with code {}: {}", cf.code, cf.reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
                None => break Some("connection dropped".to_owned()),
            },
        }
    };

    dispatcher.finish(close_error);
    debug!("hub connection task exiting");
}
