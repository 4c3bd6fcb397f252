// ── Domain model ──
//
// Canonical scan, record, session and batch types shared by every
// component and by the CLI.

pub mod batch;
pub mod device;
pub mod record;
pub mod scan;

pub use batch::{Batch, CommitReport, RecordError};
pub use device::{DeviceSessionState, DiscoveredDevice, SessionPhase};
pub use record::{ParseRecordIdError, RecordId, TransactionRecord};
pub use scan::{ScanEvent, ScanMode, parse_timestamp};
