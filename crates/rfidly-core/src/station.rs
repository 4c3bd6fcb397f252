// ── Station facade ──
//
// One operator station: the device session, the push stream, the scan
// aggregator and the batch committer wired together over a shared
// backend client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rfidly_api::transport::{TlsMode, TransportConfig};
use rfidly_api::{
    BackendClient, BatchResponse, HubConfig, HubConnection, Page, PushState, TagResponse,
    TransactionResponse,
};
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::commit::{BatchCommitter, BatchRequest};
use crate::config::{StationConfig, TlsVerification};
use crate::convert;
use crate::error::CoreError;
use crate::model::{
    CommitReport, DeviceSessionState, DiscoveredDevice, RecordId, ScanEvent, TransactionRecord,
};
use crate::persist::{FileStore, KvStore, MemoryStore, ScopedStore};
use crate::scan::{SELECTION_SCOPE, ScanAggregator, ViewSnapshot};
use crate::session::{ControlChannel, DeviceSession};
use crate::simulate;
use crate::stream::{EventStream, ListenerId, TAG_SCANNED, ViewStream};

/// Channel joined when the configuration does not name one.
pub const DEFAULT_CHANNEL: &str = "rfid-scan";

/// The main entry point for consumers.
///
/// Cheaply cloneable. Scans from the reader and from the push stream land
/// in the same aggregator; the selection it holds is what
/// [`commit_batch`](Self::commit_batch) turns into a batch.
pub struct Station<C: ControlChannel = HubConnection> {
    inner: Arc<StationInner<C>>,
}

impl<C: ControlChannel> Clone for Station<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct StationInner<C: ControlChannel> {
    config: StationConfig,
    backend: BackendClient,
    session: DeviceSession<C>,
    stream: EventStream,
    aggregator: Arc<Mutex<ScanAggregator>>,
    committer: BatchCommitter,
    stream_listener: Mutex<Option<ListenerId>>,
    // In-flight per-read saves of batch-tracked scanning.
    saves: TaskTracker,
}

fn lock(aggregator: &Mutex<ScanAggregator>) -> MutexGuard<'_, ScanAggregator> {
    aggregator.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Station<HubConnection> {
    /// Build a station talking to the configured device hub.
    pub fn new(config: StationConfig) -> Result<Self, CoreError> {
        let mut hub = HubConfig::new(config.hub_url.clone());
        hub.skip_negotiation = config.skip_negotiation;
        hub.invoke_timeout = config.timeout;
        hub.transport = build_transport(&config);
        let channel = HubConnection::new(hub)?;
        Self::with_channel(config, channel)
    }
}

impl<C: ControlChannel> Station<C> {
    /// Build a station over any control channel.
    pub fn with_channel(config: StationConfig, channel: C) -> Result<Self, CoreError> {
        let backend = BackendClient::new(config.backend_url.as_str(), &build_transport(&config))?
            .with_field_style(config.field_style)
            .with_batch_path(config.batch_path.clone());

        let store: Arc<dyn KvStore> = match &config.selection_file {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        let aggregator = ScanAggregator::with_store(ScopedStore::new(store, SELECTION_SCOPE));

        Ok(Self {
            inner: Arc::new(StationInner {
                session: DeviceSession::new(channel, config.session.clone()),
                stream: EventStream::new(config.push.clone()),
                aggregator: Arc::new(Mutex::new(aggregator)),
                committer: BatchCommitter::new(backend.clone()),
                backend,
                config,
                stream_listener: Mutex::new(None),
                saves: TaskTracker::new(),
            }),
        })
    }

    pub fn config(&self) -> &StationConfig {
        &self.inner.config
    }

    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    pub fn session(&self) -> &DeviceSession<C> {
        &self.inner.session
    }

    pub fn stream(&self) -> &EventStream {
        &self.inner.stream
    }

    // ── Device ───────────────────────────────────────────────────────

    pub fn session_state(&self) -> watch::Receiver<DeviceSessionState> {
        self.inner.session.state()
    }

    /// Discover readers with the configured vendor filter and budget.
    pub async fn discover<P>(&self, progress: P) -> Result<Vec<DiscoveredDevice>, CoreError>
    where
        P: FnMut(u32) + Send,
    {
        let settings = self.inner.session.settings();
        self.inner
            .session
            .discover_devices(&settings.vendor_filter, settings.attempt_budget, progress)
            .await
    }

    /// Connect to a reader and feed its tag reads into the aggregator.
    ///
    /// With `batch_id`, every read is also saved as a transaction of that
    /// batch as soon as it arrives.
    pub async fn start_scanning(
        &self,
        ip: &str,
        port: u16,
        batch_id: Option<i64>,
    ) -> Result<(), CoreError> {
        let aggregator = Arc::clone(&self.inner.aggregator);
        let backend = self.inner.backend.clone();
        let saves = self.inner.saves.clone();

        let listener = self.inner.session.on_tag_read(move |scan: &ScanEvent| {
            let record = TransactionRecord::temporary(scan.clone());
            let temp_id = record.id;
            lock(&aggregator).ingest_record(record.clone());

            if let Some(batch_id) = batch_id {
                let backend = backend.clone();
                let aggregator = Arc::clone(&aggregator);
                saves.spawn(async move {
                    let tx = convert::new_transaction(&record, Some(batch_id));
                    match backend.add_transaction(&tx).await {
                        Ok(id) => {
                            debug!(epc = %record.epc(), id, batch_id, "scan saved");
                            lock(&aggregator).mark_persisted(&[(temp_id, id)]);
                        }
                        Err(e) => {
                            warn!(epc = %record.epc(), batch_id, error = %e, "scan not saved");
                        }
                    }
                });
            }
        });

        if let Err(e) = self.inner.session.connect(ip, port).await {
            self.inner.session.off_tag_read(listener);
            return Err(e);
        }
        Ok(())
    }

    /// Stop the reader, then wait for reads still being saved to their
    /// batch.
    pub async fn stop_scanning(&self) {
        self.inner.session.stop().await;
        self.drain_saves().await;
    }

    async fn drain_saves(&self) {
        let saves = &self.inner.saves;
        if !saves.is_empty() {
            debug!(pending = saves.len(), "waiting for scan saves");
        }
        saves.close();
        saves.wait().await;
        saves.reopen();
    }

    pub async fn disconnect_device(&self) -> Result<bool, CoreError> {
        self.inner.session.disconnect_device().await
    }

    // ── Push stream ──────────────────────────────────────────────────

    fn ensure_stream_listener(&self) {
        let mut slot = self
            .inner
            .stream_listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return;
        }
        let aggregator = Arc::clone(&self.inner.aggregator);
        *slot = Some(self.inner.stream.on(TAG_SCANNED, move |payload| {
            match convert::push_record(payload) {
                Some(record) => {
                    lock(&aggregator).ingest_record(record);
                }
                None => warn!(%payload, "scan notification without an EPC"),
            }
        }));
    }

    /// Join the scan channel (`channel`, else the configured one) and feed
    /// its notifications into the aggregator. Idempotent.
    pub fn subscribe_stream(&self, channel: Option<&str>) -> Result<bool, CoreError> {
        self.ensure_stream_listener();
        let channel = channel
            .or_else(|| self.inner.stream.default_channel())
            .unwrap_or(DEFAULT_CHANNEL);
        let joined = self.inner.stream.subscribe(channel)?;
        if joined {
            info!(channel, "listening for scans");
        }
        Ok(joined)
    }

    pub fn push_state(&self) -> watch::Receiver<PushState> {
        self.inner.stream.state()
    }

    /// Emit `count` random scans locally through the push listeners.
    /// With `epc` set every scan reads that tag. Returns the scans emitted.
    pub fn simulate(&self, count: usize, epc: Option<&str>) -> Vec<ScanEvent> {
        self.ensure_stream_listener();
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let scan = simulate::random_scan(&mut rng, epc);
                self.inner
                    .stream
                    .emit_local(TAG_SCANNED, &convert::scan_payload(&scan));
                scan
            })
            .collect()
    }

    // ── Aggregator ───────────────────────────────────────────────────

    /// Record a scan directly, bypassing reader and push stream.
    pub fn ingest(&self, event: ScanEvent) -> RecordId {
        lock(&self.inner.aggregator).ingest(event)
    }

    pub fn view(&self) -> Arc<ViewSnapshot> {
        lock(&self.inner.aggregator).view()
    }

    pub fn subscribe_view(&self) -> ViewStream {
        lock(&self.inner.aggregator).subscribe()
    }

    pub fn toggle_select(&self, id: RecordId) -> Result<bool, CoreError> {
        lock(&self.inner.aggregator).toggle_select(id)
    }

    pub fn select_all(&self) -> usize {
        lock(&self.inner.aggregator).select_all()
    }

    pub fn clear_selection(&self) {
        lock(&self.inner.aggregator).clear_selection();
    }

    pub fn selected_records(&self) -> Vec<TransactionRecord> {
        lock(&self.inner.aggregator).selected_records()
    }

    pub fn set_count_mode(&self, enabled: bool) -> Vec<RecordId> {
        lock(&self.inner.aggregator).set_count_mode(enabled)
    }

    pub fn reset_counts(&self) {
        lock(&self.inner.aggregator).reset_counts();
    }

    // ── Commit ───────────────────────────────────────────────────────

    /// Commit the current selection as a batch.
    ///
    /// Once the backend returns a batch, saved records take their new ids
    /// and every committed record leaves the selection, even when some
    /// failed to save. Rows selected while the commit ran stay selected.
    /// A failed commit leaves the selection untouched for a retry.
    pub async fn commit_batch(&self, request: &BatchRequest) -> Result<CommitReport, CoreError> {
        let records = self.selected_records();
        let report = self.inner.committer.commit(request, &records).await?;

        let committed: Vec<RecordId> = records
            .iter()
            .map(|r| {
                report
                    .resolved
                    .iter()
                    .find(|(from, _)| *from == r.id)
                    .map_or(r.id, |(_, id)| RecordId::Persisted(*id))
            })
            .collect();
        let mut aggregator = lock(&self.inner.aggregator);
        aggregator.mark_persisted(&report.resolved);
        aggregator.deselect(&committed);
        Ok(report)
    }

    // ── Backend reads ────────────────────────────────────────────────

    pub async fn list_tags(
        &self,
        page: u32,
        per_page: u32,
        query: Option<&str>,
    ) -> Result<Page<TagResponse>, CoreError> {
        Ok(self.inner.backend.list_tags(page, per_page, query).await?)
    }

    pub async fn find_tag(&self, epc: &str) -> Result<TagResponse, CoreError> {
        self.inner
            .backend
            .find_tag(epc)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "Tag".into(),
                identifier: epc.to_owned(),
            })
    }

    pub async fn list_transactions(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<TransactionResponse>, CoreError> {
        Ok(self
            .inner
            .backend
            .list_latest_batch_transactions(page, per_page)
            .await?)
    }

    pub async fn list_batches(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<BatchResponse>, CoreError> {
        Ok(self.inner.backend.list_batches(page, per_page).await?)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Stop the device session, finish pending scan saves and close the
    /// push stream.
    pub async fn shutdown(&self) {
        self.inner.session.stop().await;
        self.drain_saves().await;
        self.inner.stream.shutdown().await;
        info!("station shut down");
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn build_transport(config: &StationConfig) -> TransportConfig {
    TransportConfig {
        tls: tls_to_transport(&config.tls),
        timeout: config.timeout,
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}
