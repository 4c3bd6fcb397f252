// Backend REST wire types
//
// Shapes returned and accepted by the inventory backend. Every list
// endpoint wraps its payload as `{ statusCode, message, data: { data, meta } }`;
// single-object endpoints may or may not wrap in `data`.

use serde::{Deserialize, Deserializer, Serialize};

// ── Envelopes ────────────────────────────────────────────────────────

/// Outer envelope of every list endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope<T> {
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Page<T>,
}

/// One page of results plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    #[serde(default)]
    pub last_page: Option<u64>,
    #[serde(default)]
    pub current_page: Option<u64>,
    #[serde(default)]
    pub per_page: Option<u64>,
    #[serde(default)]
    pub prev: Option<u64>,
    #[serde(default)]
    pub next: Option<u64>,
}

impl PageMeta {
    /// Number of pages for the given page size (at least one).
    pub fn page_count(&self, per_page: u32) -> u64 {
        let per_page = u64::from(per_page.max(1));
        self.total.div_ceil(per_page).max(1)
    }
}

/// Single-object responses arrive either bare or wrapped in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum MaybeWrapped<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> MaybeWrapped<T> {
    pub(crate) fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } | Self::Bare(data) => data,
        }
    }
}

// ── Tags ─────────────────────────────────────────────────────────────

/// A tag row as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub tag: String,
    #[serde(default)]
    pub device_no: Option<i64>,
    #[serde(default)]
    pub antenna_no: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub scan_count: Option<i64>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub expired_date: Option<String>,
    #[serde(default)]
    pub processed: bool,
}

// ── Transactions ─────────────────────────────────────────────────────

/// A persisted scan transaction.
///
/// The backend echoes whichever casing it was written with, so both the
/// camelCase and PascalCase spellings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(deserialize_with = "id_as_i64")]
    pub id: i64,
    #[serde(default, alias = "Tag", alias = "tag")]
    pub epc: Option<String>,
    #[serde(default)]
    pub rssi: Option<String>,
    #[serde(default, alias = "Timestamp")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "DeviceNo")]
    pub device_no: Option<i64>,
    #[serde(default, alias = "AntennaNo")]
    pub antenna_no: Option<i64>,
    #[serde(default, alias = "ScanCount")]
    pub scan_count: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub batch_id: Option<i64>,
}

/// Body of `POST /transaction/add`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub epc: String,
    pub rssi: String,
    pub timestamp: String,
    pub device_no: i64,
    pub antenna_no: i64,
    pub scan_count: i64,
    pub mode: String,
    pub batch_id: Option<i64>,
}

/// Key spelling the backend expects on transaction-add.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStyle {
    /// `epc`, `timestamp`, `deviceNo`, ...
    #[default]
    Camel,
    /// `Tag`, `Timestamp`, `DeviceNo`, ...
    Pascal,
}

impl NewTransaction {
    /// Render the request body in the given key style.
    pub fn to_body(&self, style: FieldStyle) -> serde_json::Value {
        let mut body = match style {
            FieldStyle::Camel => serde_json::json!({
                "epc": self.epc,
                "rssi": self.rssi,
                "timestamp": self.timestamp,
                "deviceNo": self.device_no,
                "antennaNo": self.antenna_no,
                "scanCount": self.scan_count,
                "mode": self.mode,
            }),
            FieldStyle::Pascal => serde_json::json!({
                "Tag": self.epc,
                "rssi": self.rssi,
                "Timestamp": self.timestamp,
                "DeviceNo": self.device_no,
                "AntennaNo": self.antenna_no,
                "ScanCount": self.scan_count,
                "mode": self.mode,
            }),
        };
        if let (Some(batch_id), Some(obj)) = (self.batch_id, body.as_object_mut()) {
            obj.insert("batchId".into(), batch_id.into());
        }
        body
    }
}

/// Minimal acknowledgement of transaction-add: only the id matters.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreatedId {
    #[serde(deserialize_with = "id_as_i64")]
    pub id: i64,
}

// ── Batches ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[serde(deserialize_with = "id_as_i64")]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub transaction_ids: Vec<i64>,
}

/// Body of the batch-create call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBatch {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub transaction_ids: Vec<i64>,
}

// ── Flexible id decoding ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

fn id_as_i64<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    match RawId::deserialize(de)? {
        RawId::Int(n) => Ok(n),
        RawId::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("non-numeric id {s:?}"))),
    }
}

fn id_as_string<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    Ok(match RawId::deserialize(de)? {
        RawId::Int(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> NewTransaction {
        NewTransaction {
            epc: "E2801160600002".into(),
            rssi: "-52.10".into(),
            timestamp: "2025-03-01T10:00:00Z".into(),
            device_no: 1,
            antenna_no: 2,
            scan_count: 3,
            mode: "inventory".into(),
            batch_id: None,
        }
    }

    #[test]
    fn camel_body_uses_lowercase_keys() {
        let body = sample().to_body(FieldStyle::Camel);
        assert_eq!(body["epc"], "E2801160600002");
        assert_eq!(body["deviceNo"], 1);
        assert_eq!(body["scanCount"], 3);
        assert!(body.get("batchId").is_none());
    }

    #[test]
    fn pascal_body_carries_batch_id() {
        let mut tx = sample();
        tx.batch_id = Some(42);
        let body = tx.to_body(FieldStyle::Pascal);
        assert_eq!(body["Tag"], "E2801160600002");
        assert_eq!(body["AntennaNo"], 2);
        assert_eq!(body["batchId"], 42);
        assert!(body.get("epc").is_none());
    }

    #[test]
    fn wrapped_and_bare_ids_both_decode() {
        let bare: MaybeWrapped<CreatedId> = serde_json::from_value(json!({"id": 7})).unwrap();
        let wrapped: MaybeWrapped<CreatedId> =
            serde_json::from_value(json!({"data": {"id": "8"}})).unwrap();
        assert_eq!(bare.into_inner().id, 7);
        assert_eq!(wrapped.into_inner().id, 8);
    }

    #[test]
    fn transaction_accepts_pascal_fields() {
        let tx: TransactionResponse = serde_json::from_value(json!({
            "id": 3,
            "Tag": "E2AA",
            "Timestamp": "2025-01-01 08:00:00.000",
            "DeviceNo": 1,
            "ScanCount": 4
        }))
        .unwrap();
        assert_eq!(tx.epc.as_deref(), Some("E2AA"));
        assert_eq!(tx.scan_count, Some(4));
    }

    #[test]
    fn page_count_rounds_up() {
        let meta = PageMeta { total: 21, ..PageMeta::default() };
        assert_eq!(meta.page_count(10), 3);
        assert_eq!(PageMeta::default().page_count(10), 1);
    }
}
