// ── Event stream subscriber ──
//
// Delivers push-channel notifications to in-process listeners. The
// subscriber owns its listener registry; `emit_local` injects a payload
// through the same registry without any network round trip.

mod registry;
mod view;

use std::sync::{Arc, Mutex, PoisonError};

use rfidly_api::{PushConfig, PushHandle, PushState};
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use registry::{Listener, ListenerId, ListenerRegistry};
pub use view::ViewStream;

use crate::config::PushSettings;
use crate::error::CoreError;

/// Event name the backend emits for each new scan.
pub const TAG_SCANNED: &str = "tag-scanned";

struct Connection {
    handle: PushHandle,
    pump: JoinHandle<()>,
}

/// Process-wide push subscriber.
///
/// `subscribe` is idempotent: the push connection is opened once and each
/// channel joined at most once. Notifications reach listeners in transport
/// order; events missed while disconnected are not replayed.
pub struct EventStream {
    settings: Option<PushSettings>,
    registry: Arc<ListenerRegistry<Value>>,
    state: Arc<watch::Sender<PushState>>,
    connection: Mutex<Option<Connection>>,
    cancel: CancellationToken,
}

impl EventStream {
    /// `settings` may be `None`: local emission still works, `subscribe` fails.
    pub fn new(settings: Option<PushSettings>) -> Self {
        let (state, _) = watch::channel(PushState::Disconnected);
        Self {
            settings,
            registry: Arc::new(ListenerRegistry::new()),
            state: Arc::new(state),
            connection: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// The channel configured for scans, if any.
    pub fn default_channel(&self) -> Option<&str> {
        self.settings.as_ref().map(|s| s.channel.as_str())
    }

    /// Join `channel`, opening the push connection on first use.
    ///
    /// Returns `true` if the channel was newly joined.
    pub fn subscribe(&self, channel: &str) -> Result<bool, CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::StreamSubscription {
                message: "event stream has been shut down".into(),
            });
        }
        let mut slot = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if slot.is_none() {
            let settings = self
                .settings
                .as_ref()
                .ok_or_else(|| CoreError::StreamSubscription {
                    message: "push service is not configured (set push_key)".into(),
                })?;
            let mut config = PushConfig::new(&settings.key, &settings.cluster);
            config.host.clone_from(&settings.host);

            let handle = PushHandle::connect(config, self.cancel.child_token())
                .map_err(|e| CoreError::StreamSubscription {
                    message: e.to_string(),
                })?;
            let pump = tokio::spawn(pump(
                handle.events(),
                handle.state(),
                Arc::clone(&self.registry),
                Arc::clone(&self.state),
                self.cancel.child_token(),
            ));
            info!("push stream opened");
            *slot = Some(Connection { handle, pump });
        }

        let joined = slot
            .as_ref()
            .is_some_and(|conn| conn.handle.join(channel));
        if joined {
            debug!(channel, "joined push channel");
        }
        Ok(joined)
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.registry.on(event, listener)
    }

    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.registry.off(event, id)
    }

    /// Invoke every listener for `event` with `payload`, locally.
    /// Returns how many listeners ran.
    pub fn emit_local(&self, event: &str, payload: &Value) -> usize {
        self.registry.emit(event, payload)
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.count(event)
    }

    /// Observe the push connection state.
    pub fn state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> PushState {
        self.state.borrow().clone()
    }

    /// Close the push connection for good. Listeners stay registered and
    /// `emit_local` keeps working; later `subscribe` calls fail.
    pub async fn shutdown(&self) {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.cancel.cancel();
        if let Some(conn) = connection {
            conn.handle.shutdown();
            let _ = conn.pump.await;
        }
        self.state.send_replace(PushState::Disconnected);
    }
}

/// Forward push events into the registry and mirror connection state.
async fn pump(
    mut events: broadcast::Receiver<Arc<rfidly_api::PushEvent>>,
    mut push_state: watch::Receiver<PushState>,
    registry: Arc<ListenerRegistry<Value>>,
    state: Arc<watch::Sender<PushState>>,
    cancel: CancellationToken,
) {
    state.send_replace(push_state.borrow_and_update().clone());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = push_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = push_state.borrow_and_update().clone();
                if let PushState::Error(ref message) = current {
                    warn!(%message, "push stream error");
                }
                state.send_replace(current);
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let delivered = registry.emit(&event.event, &event.data);
                    debug!(event = %event.event, delivered, "push event dispatched");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "push listeners fell behind, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("push pump exiting");
}
