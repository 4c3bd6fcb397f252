#![allow(clippy::unwrap_used)]
// Batch commit against a mocked backend.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{any, body_json, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rfidly_api::{BackendClient, TransportConfig};
use rfidly_core::{BatchCommitter, BatchRequest, CoreError, ScanEvent, TransactionRecord};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, BatchCommitter) {
    let server = MockServer::start().await;
    let backend = BackendClient::new(&server.uri(), &TransportConfig::default()).unwrap();
    (server, BatchCommitter::new(backend))
}

fn scan(epc: &str) -> ScanEvent {
    ScanEvent::new(epc, "-52.00", Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap())
}

fn fresh(epc: &str) -> TransactionRecord {
    TransactionRecord::temporary(scan(epc))
}

fn created(id: i64) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({ "id": id, "tag": "E2" }))
}

fn batch(id: i64, name: &str) -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(json!({
        "id": id,
        "name": name,
        "createdAt": "2025-05-01T09:31:00.000Z"
    }))
}

// ── Validation ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_validation_happens_before_any_request() {
    let (server, committer) = setup().await;
    Mock::given(any()).respond_with(created(1)).expect(0).mount(&server).await;

    let err = committer
        .commit(&BatchRequest::new("   "), &[fresh("E2A")])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));

    let err = committer
        .commit(&BatchRequest::new("Pallet 7"), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

// ── Resolution ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_persisted_only_selection_skips_transaction_add() {
    let (server, committer) = setup().await;

    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(created(99))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(body_json(json!({ "name": "Dock A", "transactionIds": [7, 8] })))
        .respond_with(batch(3, "Dock A"))
        .expect(1)
        .mount(&server)
        .await;

    let records = [
        TransactionRecord::persisted(7, scan("E2A")),
        TransactionRecord::persisted(8, scan("E2B")),
    ];
    let report = committer
        .commit(&BatchRequest::new("Dock A"), &records)
        .await
        .unwrap();

    assert_eq!(report.batch_id(), 3);
    assert_eq!(report.saved_count, 2);
    assert_eq!(report.failed_count, 0);
    assert!(report.resolved.is_empty());
}

#[tokio::test]
async fn test_all_saves_failing_aborts_before_batch() {
    let (server, committer) = setup().await;

    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "message": "db down" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/batch")).respond_with(batch(1, "x")).expect(0).mount(&server).await;

    let err = committer
        .commit(&BatchRequest::new("Dock A"), &[fresh("E2A"), fresh("E2B")])
        .await
        .unwrap_err();
    assert!(
        matches!(err, CoreError::BatchCommit { ref message } if message == "failed to save any transactions")
    );
}

#[tokio::test]
async fn test_partial_failure_still_creates_batch() {
    let (server, committer) = setup().await;

    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .and(body_partial_json(json!({ "epc": "E2FAIL" })))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({ "message": ["rssi invalid"] })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .and(body_partial_json(json!({
            "epc": "E2NEW",
            "timestamp": "2025-05-01T09:30:00.000Z",
            "scanCount": 1
        })))
        .respond_with(created(11))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(body_json(json!({
            "name": "Dock A",
            "description": "morning run",
            "transactionIds": [11, 7]
        })))
        .respond_with(batch(4, "Dock A"))
        .expect(1)
        .mount(&server)
        .await;

    let new_ok = fresh("E2NEW");
    let failing = fresh("E2FAIL");
    let records = [
        new_ok.clone(),
        TransactionRecord::persisted(7, scan("E2OLD")),
        failing.clone(),
    ];
    let report = committer
        .commit(
            &BatchRequest::new("Dock A").with_description("morning run"),
            &records,
        )
        .await
        .unwrap();

    assert_eq!(report.batch_id(), 4);
    assert_eq!(report.saved_count, 2);
    assert_eq!(report.failed_count, 1);
    assert!(report.is_partial());
    assert_eq!(report.transaction_ids, vec![11, 7]);
    assert_eq!(report.resolved, vec![(new_ok.id, 11)]);
    assert_eq!(report.per_record_errors.len(), 1);
    assert_eq!(report.per_record_errors[0].record, failing.id);
    assert!(report.per_record_errors[0].message.contains("rssi invalid"));
    assert_eq!(report.batch.transaction_ids, vec![11, 7]);
}

#[tokio::test]
async fn test_retry_after_batch_failure_reuses_saved_ids() {
    let (server, committer) = setup().await;

    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(created(21))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(body_json(json!({ "name": "Dock B", "transactionIds": [21] })))
        .respond_with(batch(5, "Dock B"))
        .expect(1)
        .mount(&server)
        .await;

    let record = fresh("E2RETRY");
    let request = BatchRequest::new("Dock B");

    let err = committer.commit(&request, &[record.clone()]).await.unwrap_err();
    assert!(matches!(err, CoreError::BatchCommit { .. }));
    assert_eq!(committer.cached_id(&record.id), Some(21));

    let report = committer.commit(&request, &[record.clone()]).await.unwrap();
    assert_eq!(report.batch_id(), 5);
    assert_eq!(report.resolved, vec![(record.id, 21)]);
    assert_eq!(committer.cached_id(&record.id), None);
}

#[tokio::test]
async fn test_server_batch_id_is_authoritative() {
    let (server, committer) = setup().await;

    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": "512", "name": "Wrapped", "createdAt": "2025-05-01 09:31:00" }
        })))
        .mount(&server)
        .await;

    let report = committer
        .commit(
            &BatchRequest::new("Wrapped"),
            &[TransactionRecord::persisted(1, scan("E2A"))],
        )
        .await
        .unwrap();
    assert_eq!(report.batch_id(), 512);
    assert!(report.batch.created_at.is_some());
}
