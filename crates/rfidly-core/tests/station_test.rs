#![allow(clippy::unwrap_used)]
// Station wiring: scans in, selection, commit out.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use rfidly_api::HubEvent;
use rfidly_core::{
    BatchRequest, CoreError, RecordId, ScanEvent, SessionPhase, Station, StationConfig,
};

use common::{FakeChannel, Reply, notify};

/// Hands out increasing transaction ids.
struct NextId(AtomicI64);

impl Respond for NextId {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let id = self.0.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(201).set_body_json(json!({ "id": id }))
    }
}

/// [`NextId`] answering after a fixed delay.
struct Delayed(NextId, Duration);

impl NextId {
    fn delayed(self, delay: Duration) -> Delayed {
        Delayed(self, delay)
    }
}

impl Respond for Delayed {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.0.respond(request).set_delay(self.1)
    }
}

fn config(server: &MockServer) -> StationConfig {
    StationConfig {
        backend_url: server.uri().parse().unwrap(),
        ..StationConfig::default()
    }
}

fn station(config: StationConfig, channel: FakeChannel) -> Station<FakeChannel> {
    Station::with_channel(config, channel).unwrap()
}

#[tokio::test]
async fn test_simulated_scans_commit_as_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(NextId(AtomicI64::new(100)))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(body_partial_json(json!({ "transactionIds": [100, 101, 102] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 9, "name": "Sim" })))
        .expect(1)
        .mount(&server)
        .await;

    let station = station(config(&server), FakeChannel::new());
    let scans = station.simulate(3, None);
    assert_eq!(scans.len(), 3);
    assert_eq!(station.view().len(), 3);

    assert_eq!(station.select_all(), 3);
    let report = station.commit_batch(&BatchRequest::new("Sim")).await.unwrap();
    assert_eq!(report.batch_id(), 9);
    assert_eq!(report.saved_count, 3);

    let view = station.view();
    assert_eq!(view.selected, 0);
    assert!(view.rows.iter().all(|row| !row.record.is_temporary()));
}

#[tokio::test]
async fn test_failed_commit_keeps_selection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let station = station(config(&server), FakeChannel::new());
    station.simulate(2, Some("E2DUP"));
    station.select_all();

    let err = station
        .commit_batch(&BatchRequest::new("Nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::BatchCommit { .. }));
    assert_eq!(station.view().selected, 2);
}

#[tokio::test]
async fn test_count_mode_over_simulated_duplicates() {
    let server = MockServer::start().await;
    let station = station(config(&server), FakeChannel::new());

    station.simulate(4, Some("E2A"));
    station.simulate(1, Some("E2B"));
    station.set_count_mode(true);

    let view = station.view();
    assert_eq!(view.len(), 2);
    assert_eq!(view.row("E2A").unwrap().count, 4);
    assert_eq!(view.row("E2B").unwrap().count, 1);

    station.reset_counts();
    assert!(station.view().is_empty());
}

#[tokio::test]
async fn test_selection_file_survives_a_new_station() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("selection.json");
    let config = StationConfig {
        selection_file: Some(file.clone()),
        ..config(&server)
    };

    let first = station(config.clone(), FakeChannel::new());
    first.simulate(3, None);
    let chosen = first.view().rows[1].id();
    first.toggle_select(chosen).unwrap();

    let second = station(config, FakeChannel::new());
    let restored = second.selected_records();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, chosen);

    second.clear_selection();
    let third = station(
        StationConfig {
            selection_file: Some(file),
            ..StationConfig::default()
        },
        FakeChannel::new(),
    );
    assert!(third.selected_records().is_empty());
}

#[tokio::test]
async fn test_batch_tracked_scanning_saves_each_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .and(body_partial_json(json!({ "epc": "E2TRACK", "batchId": 12, "mode": "inventory" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": 77 } })))
        .expect(1)
        .mount(&server)
        .await;

    let channel = FakeChannel::new()
        .reply("ConnectToDevice", Reply::ok(Value::Null))
        .reply("GetDeviceVersion", Reply::ok(json!("2.4")))
        .reply("StartInventory", Reply::ok(Value::Null));
    let station = station(config(&server), channel);
    let mut view = station.subscribe_view();

    station.start_scanning("10.0.0.5", 5000, Some(12)).await.unwrap();
    station
        .session()
        .channel()
        .emit(notify("TagRead", vec![json!({ "tag": "E2TRACK", "timestamp": "2025-05-01 09:30:00" })]));

    let persisted = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snap = view.changed().await.unwrap();
            if snap.rows.iter().any(|r| r.id() == RecordId::Persisted(77)) {
                return snap;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(persisted.len(), 1);

    station.stop_scanning().await;
    assert_eq!(station.session().tag_listener_count(), 0);
}

#[tokio::test]
async fn test_find_tag_missing_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tag/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statusCode": 200,
            "message": "ok",
            "data": { "data": [], "meta": { "total": 0 } }
        })))
        .mount(&server)
        .await;

    let station = station(config(&server), FakeChannel::new());
    let err = station.find_tag("E2NONE").await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { ref entity_type, .. } if entity_type == "Tag"));
}

#[tokio::test]
async fn test_subscribe_without_push_settings_fails() {
    let server = MockServer::start().await;
    let station = station(config(&server), FakeChannel::new());
    assert!(matches!(
        station.subscribe_stream(None),
        Err(CoreError::StreamSubscription { .. })
    ));
}

#[tokio::test]
async fn test_discover_uses_configured_filter_and_budget() {
    let server = MockServer::start().await;
    let channel = FakeChannel::new().reply(
        "GetDevices",
        Reply::ok(Value::Null).after(vec![
            notify("OnAttempts", vec![json!(1)]),
            notify(
                "Success",
                vec![json!([{ "mac": "00:1a:2b:3c:4d:5e", "ip": "10.0.0.7", "port": 6000 }])],
            ),
        ]),
    );
    let mut config = config(&server);
    config.session.vendor_filter = "AB".into();
    config.session.attempt_budget = 4;
    let station = station(config, channel);

    let mut attempts = Vec::new();
    let devices = station.discover(|n| attempts.push(n)).await.unwrap();

    assert_eq!(attempts, vec![1]);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].port, 6000);
    assert_eq!(
        station.session().channel().args("GetDevices").unwrap(),
        vec![json!("AB"), json!(4)]
    );
}

fn connectable() -> FakeChannel {
    FakeChannel::new()
        .reply("ConnectToDevice", Reply::ok(Value::Null))
        .reply("GetDeviceVersion", Reply::ok(json!("2.4")))
        .reply("StartInventory", Reply::ok(Value::Null))
}

#[tokio::test]
async fn test_retry_after_reader_drop_counts_each_read_once() {
    let server = MockServer::start().await;
    let station = station(config(&server), connectable());

    station.start_scanning("10.0.0.5", 5000, None).await.unwrap();
    let mut state = station.session_state();
    station.session().channel().emit(HubEvent::Closed {
        error: Some("reader dropped".into()),
    });
    state
        .wait_for(|s| s.phase == SessionPhase::Error)
        .await
        .unwrap();

    station.start_scanning("10.0.0.5", 5000, None).await.unwrap();
    assert_eq!(station.session().tag_listener_count(), 1);

    let mut view = station.subscribe_view();
    station
        .session()
        .channel()
        .emit(notify("TagRead", vec![json!({ "tag": "E2ONE", "timestamp": "2025-05-01 09:30:00" })]));
    tokio::time::timeout(Duration::from_secs(5), async {
        while view.changed().await.unwrap().is_empty() {}
    })
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let view = station.view();
    assert_eq!(view.len(), 1);
    assert_eq!(view.rows[0].record.epc(), "E2ONE");
}

#[tokio::test]
async fn test_counted_row_commits_its_occurrence_count() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .and(body_partial_json(json!({ "epc": "E2AGG", "scanCount": 3 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 300 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .and(body_partial_json(json!({ "transactionIds": [300] })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 4, "name": "Dock" })))
        .expect(1)
        .mount(&server)
        .await;

    let station = station(config(&server), FakeChannel::new());
    station.simulate(3, Some("E2AGG"));
    station.set_count_mode(true);
    assert_eq!(station.select_all(), 1);

    let report = station.commit_batch(&BatchRequest::new("Dock")).await.unwrap();
    assert_eq!(report.saved_count, 1);
}

#[tokio::test]
async fn test_commit_keeps_rows_selected_while_it_ran() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(NextId(AtomicI64::new(500)).delayed(Duration::from_millis(200)))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/batch"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 5, "name": "Late" })))
        .expect(1)
        .mount(&server)
        .await;

    let station = station(config(&server), FakeChannel::new());
    station.simulate(2, None);
    assert_eq!(station.select_all(), 2);

    let commit = {
        let station = station.clone();
        tokio::spawn(async move { station.commit_batch(&BatchRequest::new("Late")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let late = station.ingest(ScanEvent::new("E2LATE", "-60.00", chrono::Utc::now()));
    station.toggle_select(late).unwrap();

    let report = commit.await.unwrap().unwrap();
    assert_eq!(report.saved_count, 2);

    let selected = station.selected_records();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, late);
}

#[tokio::test]
async fn test_shutdown_waits_for_pending_scan_saves() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/add"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "data": { "id": 88 } }))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let station = station(config(&server), connectable());
    let mut view = station.subscribe_view();
    station.start_scanning("10.0.0.5", 5000, Some(12)).await.unwrap();
    station
        .session()
        .channel()
        .emit(notify("TagRead", vec![json!({ "tag": "E2SLOW", "timestamp": "2025-05-01 09:30:00" })]));
    tokio::time::timeout(Duration::from_secs(5), async {
        while view.changed().await.unwrap().is_empty() {}
    })
    .await
    .unwrap();

    station.shutdown().await;

    let view = station.view();
    assert_eq!(view.len(), 1);
    assert_eq!(view.rows[0].id(), RecordId::Persisted(88));
}
