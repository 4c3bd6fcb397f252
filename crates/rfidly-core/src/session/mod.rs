// ── Device session ──
//
// Explicit state machine over one control connection to one reader:
//
//   Idle ─discover─▶ Discovering ─▶ Idle | Error
//   Idle ─connect──▶ Connecting ─▶ Connected ─▶ ScanningStarted
//   any  ─stop─────▶ Stopping ─▶ Idle
//
// Reader notifications reach tag listeners through a single pump task that
// is attached on entry to Connecting and detached before the connection
// is closed.

mod channel;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rfidly_api::{HubConnection, HubEvent};
use serde_json::{Value, json};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use channel::ControlChannel;

use crate::config::SessionSettings;
use crate::convert;
use crate::error::CoreError;
use crate::model::{DeviceSessionState, DiscoveredDevice, ScanEvent, SessionPhase};
use crate::stream::{ListenerId, ListenerRegistry};

const TAG_READ: &str = "TagRead";

// ── Shared state ─────────────────────────────────────────────────────

/// State shared with the notification pump.
struct Shared {
    state: watch::Sender<DeviceSessionState>,
    // Bumped by `stop`; updates tagged with an older epoch are dropped so a
    // late failure cannot overwrite the reset.
    epoch: AtomicU64,
    tags: ListenerRegistry<ScanEvent>,
}

impl Shared {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn update(&self, epoch: u64, f: impl FnOnce(&mut DeviceSessionState)) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    fn fail(&self, epoch: u64, message: &str) {
        if self.update(epoch, |s| {
            s.phase = SessionPhase::Error;
            s.last_error = Some(message.to_owned());
        }) {
            warn!(error = message, "device session error");
        }
    }

    /// A fatal reader failure: the attached listeners go with it, so a
    /// retry starts from none.
    fn close_out(&self, epoch: u64, message: &str) {
        if self.epoch() == epoch {
            self.fail(epoch, message);
            self.tags.clear();
            debug!("tag listeners dropped after reader failure");
        }
    }
}

struct Attached {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Clears the in-flight flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── DeviceSession ────────────────────────────────────────────────────

/// Owns the control connection to exactly one reader at a time.
///
/// A second `discover_devices` or `connect` while one is running is
/// rejected with [`CoreError::SessionBusy`]. [`stop`](Self::stop) is the
/// cancellation path and is safe in any state.
pub struct DeviceSession<C: ControlChannel = HubConnection> {
    channel: C,
    settings: SessionSettings,
    shared: Arc<Shared>,
    busy: AtomicBool,
    pump: Mutex<Option<Attached>>,
}

impl<C: ControlChannel> DeviceSession<C> {
    pub fn new(channel: C, settings: SessionSettings) -> Self {
        let (state, _) = watch::channel(DeviceSessionState::default());
        Self {
            channel,
            settings,
            shared: Arc::new(Shared {
                state,
                epoch: AtomicU64::new(0),
                tags: ListenerRegistry::new(),
            }),
            busy: AtomicBool::new(false),
            pump: Mutex::new(None),
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Observe session state changes.
    pub fn state(&self) -> watch::Receiver<DeviceSessionState> {
        self.shared.state.subscribe()
    }

    pub fn current(&self) -> DeviceSessionState {
        self.shared.state.borrow().clone()
    }

    fn acquire(&self, operation: &str) -> Result<BusyGuard<'_>, CoreError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::SessionBusy {
                operation: operation.to_owned(),
            });
        }
        let guard = BusyGuard(&self.busy);
        if self.current().phase.is_active() {
            return Err(CoreError::SessionBusy {
                operation: "scanning".to_owned(),
            });
        }
        Ok(guard)
    }

    // ── Tag listeners ────────────────────────────────────────────────

    /// Called once per `TagRead` notification while a reader is attached.
    pub fn on_tag_read<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ScanEvent) + Send + Sync + 'static,
    {
        self.shared.tags.on(TAG_READ, listener)
    }

    pub fn off_tag_read(&self, id: ListenerId) -> bool {
        self.shared.tags.off(TAG_READ, id)
    }

    pub fn tag_listener_count(&self) -> usize {
        self.shared.tags.count(TAG_READ)
    }

    // ── Discovery ────────────────────────────────────────────────────

    /// Ask the hub to look for readers.
    ///
    /// `progress` receives every attempt counter the hub reports, in
    /// order. The control connection is closed afterwards whatever the
    /// outcome.
    pub async fn discover_devices<P>(
        &self,
        vendor_filter: &str,
        attempt_budget: u32,
        mut progress: P,
    ) -> Result<Vec<DiscoveredDevice>, CoreError>
    where
        P: FnMut(u32) + Send,
    {
        let _guard = self.acquire("discovery")?;
        let mut events = self.channel.notifications();
        let epoch = self.shared.epoch();
        self.shared.update(epoch, |s| {
            *s = DeviceSessionState {
                phase: SessionPhase::Discovering,
                ..DeviceSessionState::default()
            };
        });
        info!(vendor_filter, attempt_budget, "discovering devices");

        let outcome = self
            .run_discovery(&mut events, vendor_filter, attempt_budget, epoch, &mut progress)
            .await;
        self.channel.stop().await;

        match outcome {
            Ok(devices) => {
                info!(found = devices.len(), "discovery finished");
                self.shared.update(epoch, |s| s.phase = SessionPhase::Idle);
                Ok(devices)
            }
            Err(message) => {
                self.shared.fail(epoch, &message);
                Err(CoreError::Discovery { message })
            }
        }
    }

    async fn run_discovery<P>(
        &self,
        events: &mut broadcast::Receiver<HubEvent>,
        vendor_filter: &str,
        attempt_budget: u32,
        epoch: u64,
        progress: &mut P,
    ) -> Result<Vec<DiscoveredDevice>, String>
    where
        P: FnMut(u32) + Send,
    {
        self.channel.start().await.map_err(|e| e.to_string())?;

        // The hub completes GetDevices only once the scan is over, so the
        // call gets the whole discovery window.
        let invoke = self.channel.invoke_with_timeout(
            "GetDevices",
            vec![json!(vendor_filter), json!(attempt_budget)],
            self.settings.discovery_timeout,
        );
        tokio::pin!(invoke);
        let deadline = tokio::time::sleep(self.settings.discovery_timeout);
        tokio::pin!(deadline);
        let mut invoked = false;

        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Ok(HubEvent::Notification { target, arguments }) => match target.as_str() {
                        "OnAttempts" => {
                            let attempt = arguments
                                .first()
                                .and_then(Value::as_u64)
                                .and_then(|n| u32::try_from(n).ok())
                                .unwrap_or_default();
                            debug!(attempt, "discovery attempt");
                            self.shared.update(epoch, |s| s.discovery_attempts = attempt);
                            progress(attempt);
                        }
                        "Success" => {
                            let list = arguments.into_iter().next().unwrap_or(Value::Null);
                            return serde_json::from_value(list)
                                .map_err(|e| format!("malformed device list: {e}"));
                        }
                        "Error" => return Err(notification_message(&arguments)),
                        other => debug!(method = other, "ignoring hub notification"),
                    },
                    Ok(HubEvent::Closed { error }) => {
                        return Err(error.unwrap_or_else(|| {
                            "control connection closed before discovery completed".into()
                        }));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "discovery notifications dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err("notification stream ended".into());
                    }
                },
                result = &mut invoke, if !invoked => {
                    invoked = true;
                    if let Err(e) = result {
                        return Err(e.to_string());
                    }
                }
                () = &mut deadline => {
                    return Err(format!(
                        "no device responded within {}s",
                        self.settings.discovery_timeout.as_secs()
                    ));
                }
            }
        }
    }

    // ── Connect ──────────────────────────────────────────────────────

    /// Connect to a reader and start inventory scanning.
    ///
    /// Runs `ConnectToDevice`, `GetDeviceVersion` and `StartInventory` as
    /// one operation; an `Error` notification from the hub fails it.
    pub async fn connect(&self, ip: &str, port: u16) -> Result<(), CoreError> {
        let _guard = self.acquire("connect")?;
        let mut events = self.channel.notifications();
        let epoch = self.shared.epoch();
        self.shared.update(epoch, |s| {
            *s = DeviceSessionState {
                phase: SessionPhase::Connecting,
                device_ip: Some(ip.to_owned()),
                ..DeviceSessionState::default()
            };
        });
        info!(ip, port, "connecting to reader");
        self.attach(epoch);

        match self.run_connect(&mut events, ip, port, epoch).await {
            Ok(()) => {
                if self
                    .shared
                    .update(epoch, |s| s.phase = SessionPhase::ScanningStarted)
                {
                    info!(ip, "inventory scanning started");
                    Ok(())
                } else {
                    Err(CoreError::Connection {
                        message: "session stopped while connecting".into(),
                    })
                }
            }
            Err(message) => {
                self.detach().await;
                self.channel.stop().await;
                self.shared.fail(epoch, &message);
                Err(CoreError::Connection { message })
            }
        }
    }

    async fn run_connect(
        &self,
        events: &mut broadcast::Receiver<HubEvent>,
        ip: &str,
        port: u16,
        epoch: u64,
    ) -> Result<(), String> {
        self.channel.start().await.map_err(|e| e.to_string())?;

        let sequence = async {
            self.channel
                .invoke("ConnectToDevice", vec![json!(ip), json!(port)])
                .await?;
            self.shared.update(epoch, |s| s.phase = SessionPhase::Connected);

            let version = self.channel.invoke("GetDeviceVersion", Vec::new()).await?;
            let version = match version {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            };
            debug!(version = ?version, "reader version");
            self.shared.update(epoch, |s| s.device_version = version);

            self.channel.invoke("StartInventory", Vec::new()).await?;
            Ok::<(), rfidly_api::Error>(())
        };
        tokio::pin!(sequence);
        let mut listening = true;

        loop {
            tokio::select! {
                biased;
                event = events.recv(), if listening => match event {
                    Ok(HubEvent::Notification { target, arguments }) if target == "Error" => {
                        return Err(notification_message(&arguments));
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => listening = false,
                },
                result = &mut sequence => return result.map_err(|e| e.to_string()),
            }
        }
    }

    // ── Stop / disconnect ────────────────────────────────────────────

    /// Stop scanning, drop every session listener, close the connection,
    /// and reset to `Idle`. Safe in any state.
    pub async fn stop(&self) {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.current().phase;
        self.shared.update(epoch, |s| s.phase = SessionPhase::Stopping);

        if previous.is_active() {
            if let Err(e) = self.channel.invoke("StopInventory", Vec::new()).await {
                warn!(error = %e, "StopInventory failed, closing anyway");
            }
        }

        self.detach().await;
        self.shared.tags.clear();
        self.channel.stop().await;

        self.shared
            .update(epoch, |s| *s = DeviceSessionState::default());
        info!(from = %previous, "device session stopped");
    }

    /// Ask the reader to disconnect, then stop the session.
    ///
    /// Returns `true` when the reader confirmed with `Disconnected(true)`
    /// within the configured wait.
    pub async fn disconnect_device(&self) -> Result<bool, CoreError> {
        let guard = self.busy_for_disconnect()?;
        let mut events = self.channel.notifications();

        let requested = async {
            self.channel.start().await?;
            self.channel.invoke("Disconnect", Vec::new()).await
        }
        .await;
        if let Err(e) = requested {
            drop(guard);
            self.stop().await;
            return Err(CoreError::Connection {
                message: e.to_string(),
            });
        }

        let confirmed = tokio::time::timeout(self.settings.disconnect_wait, async {
            loop {
                match events.recv().await {
                    Ok(HubEvent::Notification { target, arguments }) if target == "Disconnected" => {
                        return arguments.first().and_then(Value::as_bool).unwrap_or(false);
                    }
                    Ok(HubEvent::Closed { .. }) | Err(broadcast::error::RecvError::Closed) => {
                        return false;
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        })
        .await
        .unwrap_or(false);

        drop(guard);
        self.stop().await;
        info!(confirmed, "reader disconnect requested");
        Ok(confirmed)
    }

    // Disconnect is allowed while scanning, so only the in-flight flag applies.
    fn busy_for_disconnect(&self) -> Result<BusyGuard<'_>, CoreError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| CoreError::SessionBusy {
                operation: "disconnect".to_owned(),
            })
    }

    // ── Pump ─────────────────────────────────────────────────────────

    fn attach(&self, epoch: u64) {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            self.channel.notifications(),
            Arc::clone(&self.shared),
            epoch,
            cancel.clone(),
        ));
        let previous = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(Attached { cancel, task });
        if let Some(old) = previous {
            old.cancel.cancel();
        }
    }

    async fn detach(&self) {
        let attached = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(attached) = attached {
            attached.cancel.cancel();
            let _ = attached.task.await;
        }
    }
}

fn notification_message(arguments: &[Value]) -> String {
    match arguments.first() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "device hub reported an error".into(),
    }
}

/// Route reader notifications while a reader is attached.
async fn pump(
    mut events: broadcast::Receiver<HubEvent>,
    shared: Arc<Shared>,
    epoch: u64,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(HubEvent::Notification { target, arguments }) => match target.as_str() {
                TAG_READ => match convert::tag_read_event(&arguments) {
                    Some(scan) => {
                        let delivered = shared.tags.emit(TAG_READ, &scan);
                        debug!(epc = %scan.epc, delivered, "tag read");
                    }
                    None => warn!(?arguments, "tag read without an EPC"),
                },
                "Connected" => debug!("reader reports connected"),
                "InventoryStarted" => debug!("reader reports inventory started"),
                "Error" => {
                    shared.close_out(epoch, &notification_message(&arguments));
                    break;
                }
                other => debug!(method = other, "ignoring hub notification"),
            },
            Ok(HubEvent::Closed { error }) => {
                let message = error.unwrap_or_else(|| "control connection closed".into());
                shared.close_out(epoch, &message);
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "reader notifications dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("reader pump exiting");
}
