//! Real-time scan ingestion and device control for RFID inventory stations.
//!
//! This crate sits between `rfidly-api` (wire clients) and the `rfidly`
//! CLI and owns the domain logic:
//!
//! - **[`DeviceSession`]**: Explicit state machine over the control
//!   connection to one reader: discovery with live attempt counts, the
//!   composite connect + start-inventory operation, tag-read listeners, and
//!   a `stop()` that is safe from any state.
//!
//! - **[`EventStream`]**: Push-channel subscriber with its own listener
//!   registry. `subscribe` is idempotent; `emit_local` drives listeners
//!   without a network round trip.
//!
//! - **[`ScanAggregator`]**: Raw scan list plus per-EPC aggregate, the
//!   operator [`Selection`] mirrored to a [`KvStore`], and view snapshots
//!   published through [`ViewStream`].
//!
//! - **[`BatchCommitter`]**: Turns a selection into a batch with
//!   sequential per-record saves and partial-failure reporting.
//!
//! - **[`Station`]**: Facade wiring the four together for one operator.

pub mod commit;
pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod persist;
pub mod scan;
pub mod session;
pub mod simulate;
pub mod station;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use commit::{BatchCommitter, BatchRequest};
pub use config::{PushSettings, SessionSettings, StationConfig, TlsVerification};
pub use error::CoreError;
pub use persist::{FileStore, KvStore, MemoryStore, ScopedStore};
pub use scan::{AggregateEntry, ScanAggregator, Selection, ViewRow, ViewSnapshot};
pub use session::{ControlChannel, DeviceSession};
pub use station::{DEFAULT_CHANNEL, Station};
pub use stream::{EventStream, ListenerId, TAG_SCANNED, ViewStream};

pub use model::{
    Batch, CommitReport, DeviceSessionState, DiscoveredDevice, RecordError, RecordId, ScanEvent,
    ScanMode, SessionPhase, TransactionRecord,
};

// ── Wire types surfaced by the facade ───────────────────────────────
pub use rfidly_api::{
    BatchResponse, FieldStyle, Page, PageMeta, PushState, TagResponse, TransactionResponse,
};
