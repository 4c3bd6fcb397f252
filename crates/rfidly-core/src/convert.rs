// ── Wire ↔ domain conversions ──
//
// Reader notifications and push payloads are loosely typed JSON; these
// helpers pull the fields we rely on and fill the gaps.

use chrono::Utc;
use rfidly_api::{BatchResponse, NewTransaction};
use serde_json::{Value, json};
use tracing::warn;

use crate::model::{Batch, ScanEvent, ScanMode, TransactionRecord, parse_timestamp};

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Format an RSSI reading with two decimals, passing unparsable text through.
fn rssi(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(n)) => n.as_f64().map_or_else(|| n.to_string(), |f| format!("{f:.2}")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_or_else(|_| s.trim().to_owned(), |f| format!("{f:.2}")),
        _ => String::new(),
    }
}

fn timestamp(value: Option<&Value>) -> chrono::DateTime<Utc> {
    let parsed = match value {
        Some(Value::String(s)) => parse_timestamp(s),
        Some(Value::Number(n)) => n.as_i64().and_then(|ms| parse_timestamp(&ms.to_string())),
        _ => None,
    };
    parsed.unwrap_or_else(Utc::now)
}

/// Build a scan from a reader `TagRead` notification.
///
/// The first argument carries `{tag, deviceNo, antennaNo, timestamp}` and
/// optionally `rssi`. Returns `None` when no EPC is present.
pub fn tag_read_event(arguments: &[Value]) -> Option<ScanEvent> {
    let tag = arguments.first()?;
    let epc = match tag {
        Value::String(_) => text(Some(tag)),
        _ => text(tag.get("tag")).or_else(|| text(tag.get("epc"))),
    }?;

    Some(
        ScanEvent::new(
            epc,
            rssi(tag.get("rssi")),
            timestamp(tag.get("timestamp")),
        )
        .with_mode(ScanMode::Inventory)
        .with_ports(
            integer(tag.get("deviceNo")).unwrap_or(1),
            integer(tag.get("antennaNo")).unwrap_or(1),
        ),
    )
}

/// Build a record from a `tag-scanned` push payload
/// `{timestamp, epc, rssi, mode, id?, isTemp?}`.
///
/// A payload with an `id` and without `isTemp: true` is already persisted.
pub fn push_record(payload: &Value) -> Option<TransactionRecord> {
    let epc = text(payload.get("epc")).or_else(|| text(payload.get("tag")))?;
    let mode = payload
        .get("mode")
        .and_then(Value::as_str)
        .and_then(|m| m.parse::<ScanMode>().ok())
        .unwrap_or_default();

    let event = ScanEvent::new(
        epc,
        rssi(payload.get("rssi")),
        timestamp(payload.get("timestamp")),
    )
    .with_mode(mode)
    .with_ports(
        integer(payload.get("deviceNo")).unwrap_or(1),
        integer(payload.get("antennaNo")).unwrap_or(1),
    );

    let is_temp = payload
        .get("isTemp")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let mut record = match integer(payload.get("id")) {
        Some(id) if !is_temp => TransactionRecord::persisted(id, event),
        _ => TransactionRecord::temporary(event),
    };
    if let Some(count) = integer(payload.get("scanCount")).and_then(|c| u32::try_from(c).ok()) {
        record.scan_count = count.max(1);
    }
    Some(record)
}

/// Push payload for a locally produced scan, as the backend would emit it.
pub fn scan_payload(event: &ScanEvent) -> Value {
    json!({
        "timestamp": event.timestamp_iso(),
        "epc": event.epc,
        "rssi": event.rssi,
        "mode": event.mode.to_string(),
        "deviceNo": event.device_no,
        "antennaNo": event.antenna_no,
        "isTemp": true,
    })
}

/// Transaction-add body for a record, optionally tagged with a batch.
pub fn new_transaction(record: &TransactionRecord, batch_id: Option<i64>) -> NewTransaction {
    NewTransaction {
        epc: record.event.epc.clone(),
        rssi: record.event.rssi.clone(),
        timestamp: record.event.timestamp_iso(),
        device_no: record.event.device_no,
        antenna_no: record.event.antenna_no,
        scan_count: i64::from(record.scan_count),
        mode: record.event.mode.to_string(),
        batch_id,
    }
}

pub fn batch_from_response(response: BatchResponse, fallback_ids: &[i64]) -> Batch {
    let created_at = response.created_at.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!(raw, "unparsable batch createdAt");
        }
        parsed
    });
    Batch {
        id: response.id,
        name: response.name,
        description: response.description,
        created_at,
        transaction_ids: if response.transaction_ids.is_empty() {
            fallback_ids.to_vec()
        } else {
            response.transaction_ids
        },
    }
}
