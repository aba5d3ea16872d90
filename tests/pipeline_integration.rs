//! End-to-end pipeline tests over the in-memory transports.
//!
//! A scripted source replaces the timer-driven simulator so event order is
//! fully deterministic: probe completion, samples, and batch boundaries are
//! replayed exactly as queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use telespool::pipeline::{Pipeline, PipelineSettings, SessionToken};
use telespool::source::{ProbeSpec, Sample, SourceError, SourceEvent, TelemetrySource};
use telespool::transport::{MemoryHub, MemoryStore, ObjectStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Replays a fixed event sequence, then ends the stream.
struct ScriptedSource {
    device: String,
    events: Mutex<Option<Vec<SourceEvent>>>,
    started: AtomicBool,
}

impl ScriptedSource {
    fn new(device: &str, events: Vec<SourceEvent>) -> Self {
        Self {
            device: device.to_string(),
            events: Mutex::new(Some(events)),
            started: AtomicBool::new(false),
        }
    }

    fn streaming_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TelemetrySource for ScriptedSource {
    async fn discover(&self) -> Result<Vec<String>, SourceError> {
        Ok(vec![self.device.clone()])
    }

    async fn probe(&self, spec: ProbeSpec) -> Result<mpsc::Receiver<SourceEvent>, SourceError> {
        if spec.device != self.device {
            return Err(SourceError::DeviceUnavailable(spec.device));
        }
        let events = self
            .events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| SourceError::Probe("already probed".to_string()))?;

        let (tx, rx) = mpsc::channel(events.len().max(1));
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            // Dropping the sender ends the stream.
        });
        Ok(rx)
    }

    async fn start_streaming(&self) -> Result<(), SourceError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn sample(name: &str, subtype: &str, value: &str, sequence: u64) -> SourceEvent {
    SourceEvent::SampleChanged(Sample {
        name: name.to_string(),
        subtype: subtype.to_string(),
        value: value.to_string(),
        timestamp: Utc
            .with_ymd_and_hms(2016, 7, 22, 15, 10, 50)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(123))
            .unwrap(),
        sequence,
    })
}

fn session() -> SessionToken {
    let started = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    SessionToken::new("mill-1", started)
}

fn settings() -> PipelineSettings {
    PipelineSettings {
        sample_count: 100,
        update_interval: Duration::from_millis(10),
        handshake_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

#[tokio::test]
async fn hub_mode_streams_after_handshake() {
    let source = Arc::new(ScriptedSource::new(
        "mill-1",
        vec![
            SourceEvent::ProbeCompleted,
            sample("controllermode", "", "AUTOMATIC", 1),
            sample("execution", "", "ACTIVE", 2),
            SourceEvent::BatchChanged,
        ],
    ));
    let hub = Arc::new(MemoryHub::with_auto_assign("data"));

    let pipeline = Pipeline::new(
        Arc::clone(&source),
        session(),
        settings(),
        CancellationToken::new(),
    );
    pipeline.run_with_hub(Arc::clone(&hub)).await.unwrap();

    assert!(source.streaming_started());
    // The assignment message was acknowledged exactly once.
    assert_eq!(hub.acked_ids().len(), 1);

    let sent = hub.sent();
    // Readiness goes out before any telemetry.
    assert_eq!(sent[0].message_type(), Some("deviceready"));
    let telemetry: Vec<_> = sent[1..]
        .iter()
        .filter(|m| m.message_type() == Some("machineData"))
        .collect();
    assert_eq!(telemetry.len(), 2, "one upload per channel with data");

    // Each upload carries exactly one formatted line, no cross-contamination.
    for message in telemetry {
        let payload: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
        let data = payload["MachineData"].as_str().unwrap();
        assert_eq!(data.lines().count(), 1);
        let url = payload["BlobUrl"].as_str().unwrap();
        if url.ends_with("_CONTROLLERMODE") {
            assert_eq!(
                data,
                "07/22/2016 03:10:50.123 PM,1469200250.123,AUTOMATIC,1\n"
            );
        } else if url.ends_with("_EXECUTION") {
            assert_eq!(data, "07/22/2016 03:10:50.123 PM,1469200250.123,ACTIVE,2\n");
        } else {
            panic!("unexpected destination {url}");
        }
        assert_eq!(payload["DeviceName"], "mill-1");
        assert_eq!(payload["SessionId"], session().as_str());
    }
}

#[tokio::test]
async fn consecutive_batches_upload_separately() {
    let source = Arc::new(ScriptedSource::new(
        "mill-1",
        vec![
            SourceEvent::ProbeCompleted,
            sample("program", "", "O1000", 1),
            SourceEvent::BatchChanged,
            sample("program", "", "O2000", 2),
            SourceEvent::BatchChanged,
        ],
    ));
    let hub = Arc::new(MemoryHub::with_auto_assign("data"));

    let pipeline = Pipeline::new(source, session(), settings(), CancellationToken::new());
    pipeline.run_with_hub(Arc::clone(&hub)).await.unwrap();

    let uploads: Vec<String> = hub
        .sent()
        .iter()
        .filter(|m| m.message_type() == Some("machineData"))
        .map(|m| {
            let payload: serde_json::Value = serde_json::from_slice(&m.payload).unwrap();
            payload["MachineData"].as_str().unwrap().to_string()
        })
        .collect();

    // Two sequential uploads, one line each: buffers never accumulate
    // across flushes.
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[0].lines().count(), 1);
    assert_eq!(uploads[1].lines().count(), 1);
    assert!(uploads[0].contains("O1000"));
    assert!(uploads[1].contains("O2000"));
}

#[tokio::test]
async fn unmapped_and_filtered_samples_never_upload() {
    let source = Arc::new(ScriptedSource::new(
        "mill-1",
        vec![
            SourceEvent::ProbeCompleted,
            sample("axisload", "", "75", 1),
            sample("pathfeedrate", "COMMANDED", "160", 2),
            SourceEvent::BatchChanged,
        ],
    ));
    let hub = Arc::new(MemoryHub::with_auto_assign("data"));

    let pipeline = Pipeline::new(source, session(), settings(), CancellationToken::new());
    pipeline.run_with_hub(Arc::clone(&hub)).await.unwrap();

    let telemetry = hub
        .sent()
        .iter()
        .filter(|m| m.message_type() == Some("machineData"))
        .count();
    assert_eq!(telemetry, 0);
}

#[tokio::test]
async fn store_mode_appends_committed_blocks() {
    let source = Arc::new(ScriptedSource::new(
        "mill-1",
        vec![
            SourceEvent::ProbeCompleted,
            sample("execution", "", "ACTIVE", 1),
            SourceEvent::BatchChanged,
            sample("execution", "", "STOPPED", 2),
            SourceEvent::BatchChanged,
        ],
    ));
    let store = Arc::new(MemoryStore::new());

    let session = session();
    let destination = format!("data/{}_EXECUTION", session.as_str());

    let pipeline = Pipeline::new(source, session, settings(), CancellationToken::new());
    pipeline
        .run_with_store(Arc::clone(&store), "data")
        .await
        .unwrap();

    // Two batches: header + 2 blocks committed.
    let ids = store.block_list(&destination).await.unwrap();
    assert_eq!(ids.len(), 3);

    // Read-back is byte-identical: header row, then batches in commit order.
    let content = String::from_utf8(store.read_back(&destination).unwrap()).unwrap();
    assert_eq!(
        content,
        "datetime,unixdatetime,value,sequence\n\
         07/22/2016 03:10:50.123 PM,1469200250.123,ACTIVE,1\n\
         07/22/2016 03:10:50.123 PM,1469200250.123,STOPPED,2\n"
    );
}

#[tokio::test]
async fn store_mode_recovers_from_transient_commit_failure() {
    let source = Arc::new(ScriptedSource::new(
        "mill-1",
        vec![
            SourceEvent::ProbeCompleted,
            sample("toolnumber", "", "7", 1),
            SourceEvent::BatchChanged,
        ],
    ));
    let store = Arc::new(MemoryStore::new());
    store.fail_next_commits(1);

    let session = session();
    let destination = format!("data/{}_TOOLID", session.as_str());

    let mut settings = settings();
    settings.retry.initial_backoff = Duration::from_millis(1);
    settings.retry.max_backoff = Duration::from_millis(2);

    let pipeline = Pipeline::new(source, session, settings, CancellationToken::new());
    pipeline
        .run_with_store(Arc::clone(&store), "data")
        .await
        .unwrap();

    let content = String::from_utf8(store.read_back(&destination).unwrap()).unwrap();
    assert!(content.starts_with("datetime,unixdatetime,value,sequence\n"));
    assert!(content.contains(",7,1\n"));
}
