//! End-to-end pipeline tests
//!
//! Real HTTP scoring client against a wiremock endpoint, real sled store in a
//! temp directory, batches built from encoded envelopes.

use bigdecimal::BigDecimal;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telemetry_scorer::acquisition::encode_envelope;
use telemetry_scorer::config::ScorerConfig;
use telemetry_scorer::pipeline::{
    Dispatcher, EnvelopeBatch, FailureKind, LogRecord, RecordState, Stage,
};
use telemetry_scorer::storage::{RecordStore, SledRecordStore, WriteOutcome};
use telemetry_scorer::{HttpScoringClient, PartitionKey, RawReading, SensorFields};

const TS: i64 = 1_690_000_000_000;
const NORMAL_LINE: &str = "28.0,40.0,0.03,101.0,12.0,0.8";
const SPIKE_LINE: &str = "85.0,40.0,1.5,230.0,5.0,2.0";

fn normal_reading(device: &str, ts: i64) -> RawReading {
    RawReading::new(
        device,
        ts,
        SensorFields {
            temp_c: Some(28.0),
            humidity_pct: Some(40.0),
            vibration_g: Some(0.03),
            pressure_kpa: Some(101.0),
            voltage_v: Some(12.0),
            current_a: Some(0.8),
        },
    )
}

fn spike_reading(device: &str, ts: i64) -> RawReading {
    RawReading::new(
        device,
        ts,
        SensorFields {
            temp_c: Some(85.0),
            humidity_pct: Some(40.0),
            vibration_g: Some(1.5),
            pressure_kpa: Some(230.0),
            voltage_v: Some(5.0),
            current_a: Some(2.0),
        },
    )
}

fn record(reading: &RawReading, seq: u64) -> LogRecord {
    LogRecord {
        data: encode_envelope(reading).unwrap(),
        partition_key: Some(reading.device_id.clone()),
        sequence_number: Some(seq.to_string()),
    }
}

async fn mount_score(server: &MockServer, line: &str, body: &str) {
    Mock::given(method("POST"))
        .and(path("/invocations"))
        .and(body_string(line))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

struct Harness {
    dispatcher: Dispatcher,
    store: Arc<SledRecordStore>,
    _dir: tempfile::TempDir,
}

fn harness(server: &MockServer, tweak: impl FnOnce(&mut ScorerConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ScorerConfig::default();
    config.scoring.endpoint_url = format!("{}/invocations", server.uri());
    config.store.path = dir.path().join("records.db");
    tweak(&mut config);

    let store = Arc::new(SledRecordStore::open(&config.store.path, true).unwrap());
    let scorer = Arc::new(HttpScoringClient::new(&config.scoring).unwrap());
    let dispatcher = Dispatcher::new(Arc::new(config), scorer, store.clone());
    Harness {
        dispatcher,
        store,
        _dir: dir,
    }
}

fn pk(device: &str) -> PartitionKey {
    PartitionKey::for_timestamp(device, TS).unwrap()
}

#[tokio::test]
async fn test_scores_decide_and_persist_exact_decimals() {
    let server = MockServer::start().await;
    mount_score(&server, NORMAL_LINE, "0.12").await;
    mount_score(&server, SPIKE_LINE, "0.91\n").await;
    let h = harness(&server, |_| {});

    let batch = EnvelopeBatch::new(vec![
        record(&normal_reading("dev-1", TS), 1),
        record(&spike_reading("dev-1", TS + 1), 2),
    ]);
    let report = h.dispatcher.dispatch(&batch).await;

    assert_eq!(report.persisted, 2);
    assert_eq!(report.anomalies, 1);
    assert!(!report.should_redeliver);

    let stored = h.store.query_partition(&pk("dev-1")).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].pk.as_str(), "dev-1#2023-07-22");
    assert_eq!(stored[0].ts, TS);
    assert_eq!(stored[0].score, "0.12".parse::<BigDecimal>().unwrap());
    assert_eq!(stored[0].anomaly, 0);
    assert_eq!(stored[0].vibration_g, "0.03".parse::<BigDecimal>().unwrap());
    assert_eq!(stored[1].score, "0.91".parse::<BigDecimal>().unwrap());
    assert_eq!(stored[1].anomaly, 1);

    // Decimals are stored as their decimal strings
    let json = serde_json::to_value(&stored[0]).unwrap();
    assert_eq!(json["score"], "0.12");
    assert_eq!(json["current_a"], "0.8");
    assert_eq!(json["deviceId"], "dev-1");
}

#[tokio::test]
async fn test_malformed_envelope_does_not_block_siblings() {
    let server = MockServer::start().await;
    mount_score(&server, NORMAL_LINE, "0.12").await;
    let h = harness(&server, |_| {});

    let batch = EnvelopeBatch::new(vec![
        record(&normal_reading("dev-1", TS), 1),
        LogRecord::new("bm90IGpzb24="), // base64("not json")
        record(&normal_reading("dev-2", TS), 3),
    ]);
    let report = h.dispatcher.dispatch(&batch).await;

    assert_eq!(report.persisted, 2);
    assert_eq!(report.failures_of(FailureKind::Decode), 1);
    assert!(!report.should_redeliver);
    match &report.records[1].state {
        RecordState::Failed { stage, kind, .. } => {
            assert_eq!(*stage, Stage::Decoded);
            assert_eq!(*kind, FailureKind::Decode);
        }
        other => panic!("expected decode failure, got {other:?}"),
    }
    assert_eq!(h.store.count().unwrap(), 2);
}

#[tokio::test]
async fn test_non_numeric_score_is_parse_failure_without_write() {
    let server = MockServer::start().await;
    mount_score(&server, NORMAL_LINE, "error").await;
    let h = harness(&server, |_| {});

    let report = h
        .dispatcher
        .dispatch(&EnvelopeBatch::new(vec![record(&normal_reading("dev-1", TS), 1)]))
        .await;

    assert_eq!(report.failures_of(FailureKind::Parse), 1);
    assert!(!report.should_redeliver);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_endpoint_error_requests_redelivery_and_redelivery_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_score(&server, NORMAL_LINE, "0.12").await;
    let h = harness(&server, |_| {});

    let batch = EnvelopeBatch::new(vec![record(&normal_reading("dev-1", TS), 1)]);

    let first = h.dispatcher.dispatch(&batch).await;
    assert!(first.should_redeliver);
    assert_eq!(first.failures_of(FailureKind::Scoring), 1);
    assert_eq!(h.store.count().unwrap(), 0);

    let second = h.dispatcher.dispatch(&batch).await;
    assert_eq!(second.persisted, 1);
    let third = h.dispatcher.dispatch(&batch).await;
    match &third.records[0].state {
        RecordState::Persisted { write, .. } => assert_eq!(*write, WriteOutcome::Unchanged),
        other => panic!("expected persisted, got {other:?}"),
    }
    assert_eq!(h.store.count().unwrap(), 1);
}

#[tokio::test]
async fn test_batch_deadline_times_out_slow_scoring() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("0.12")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let h = harness(&server, |c| c.dispatch.batch_deadline_ms = 200);

    let report = h
        .dispatcher
        .dispatch(&EnvelopeBatch::new(vec![record(&normal_reading("dev-1", TS), 1)]))
        .await;

    assert!(report.should_redeliver);
    match &report.records[0].state {
        RecordState::Failed { stage, kind, .. } => {
            assert_eq!(*kind, FailureKind::Timeout);
            assert_eq!(*stage, Stage::Scored);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(report.records[0].device_id.as_deref(), Some("dev-1"));
    assert!(report.elapsed_ms < 5_000);
    assert_eq!(h.store.count().unwrap(), 0);
}

#[tokio::test]
async fn test_missing_fields_are_scored_as_zero() {
    let server = MockServer::start().await;
    mount_score(&server, "31.5,0.0,0.0,0.0,0.0,0.0", "0.5").await;
    let h = harness(&server, |_| {});

    let reading = RawReading::new(
        "dev-9",
        TS,
        SensorFields {
            temp_c: Some(31.5),
            ..SensorFields::default()
        },
    );
    let report = h
        .dispatcher
        .dispatch(&EnvelopeBatch::new(vec![record(&reading, 1)]))
        .await;

    // 0.5 sits exactly on the default threshold and counts as anomalous
    assert_eq!(report.anomalies, 1);
    let stored = h.store.get(&pk("dev-9"), TS).unwrap().unwrap();
    assert_eq!(stored.humidity_pct, BigDecimal::from(0));
    assert_eq!(stored.anomaly, 1);
}
