//! Shared helpers for command handlers.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tabled::Tabled;

use rfidly_core::{CoreError, Page, RecordId, ScanEvent, Station, TransactionRecord, ViewRow};

use crate::cli::{GlobalOpts, ListArgs};
use crate::error::CliError;
use crate::output;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ScanRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "EPC")]
    epc: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Dev/Ant")]
    port: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Sel")]
    selected: &'static str,
}

impl From<&ViewRow> for ScanRow {
    fn from(row: &ViewRow) -> Self {
        let event = &row.record.event;
        Self {
            id: row.id().to_string(),
            epc: event.epc.clone(),
            rssi: event.rssi.clone(),
            time: local_time(&event.timestamp),
            mode: event.mode.to_string(),
            port: format!("{}/{}", event.device_no, event.antenna_no),
            count: row.count,
            selected: if row.selected { "*" } else { "" },
        }
    }
}

impl From<&TransactionRecord> for ScanRow {
    fn from(record: &TransactionRecord) -> Self {
        Self::from(&ViewRow {
            record: record.clone(),
            count: u64::from(record.scan_count),
            selected: true,
        })
    }
}

pub fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

// ── Rendering ───────────────────────────────────────────────────────

/// Print the station's current view in the chosen format.
pub fn print_view(station: &Station, global: &GlobalOpts) {
    let view = station.view();
    let out = output::render_list(
        &global.output,
        &view.rows,
        |r| ScanRow::from(r),
        |r| r.id().to_string(),
    );
    output::print_output(&out, global.quiet);
}

/// Print selected records in the chosen format.
pub fn print_records(records: &[TransactionRecord], global: &GlobalOpts) {
    let out = output::render_list(
        &global.output,
        records,
        |r| ScanRow::from(r),
        |r| r.id.to_string(),
    );
    output::print_output(&out, global.quiet);
}

/// One line per live read, written to stderr.
pub fn live_line(scan: &ScanEvent, color: bool) -> String {
    format!(
        "{}  {}  {} dBm  dev {} ant {}",
        scan.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        output::epc(&scan.epc, color),
        scan.rssi,
        scan.device_no,
        scan.antenna_no,
    )
}

// ── Capture runs ────────────────────────────────────────────────────

/// Resolves after `duration` seconds, or never.
pub async fn deadline(duration: Option<u64>) {
    match duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => std::future::pending().await,
    }
}

/// End-of-run bookkeeping shared by `scan`, `watch` and `simulate`.
pub fn finish_capture(station: &Station, select_all: bool, global: &GlobalOpts) {
    if select_all {
        let selected = station.select_all();
        if !global.quiet {
            eprintln!("Selected {selected} record(s)");
        }
    }
    print_view(station, global);
}

// ── Parsing ─────────────────────────────────────────────────────────

pub fn parse_record_id(raw: &str) -> Result<RecordId, CliError> {
    raw.parse::<RecordId>().map_err(|e| CliError::Validation {
        field: "id".into(),
        reason: e.to_string(),
    })
}

// ── Pagination ──────────────────────────────────────────────────────

/// Fetch the requested page, or every page with `--all`.
pub async fn collect_pages<T, F, Fut>(list: &ListArgs, fetch: F) -> Result<Vec<T>, CliError>
where
    F: Fn(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>, CoreError>>,
{
    if !list.all {
        return Ok(fetch(list.page.max(1), list.limit).await?.data);
    }

    let mut all = Vec::new();
    let mut page_no: u32 = 1;
    loop {
        let page = fetch(page_no, list.limit).await?;
        let received = page.data.len();
        let pages = page.meta.page_count(list.limit);
        all.extend(page.data);

        if received == 0 || u64::from(page_no) >= pages {
            break;
        }
        page_no += 1;
    }
    Ok(all)
}
