// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


/// Recording manager and session tests
///
/// These tests verify the complete recording lifecycle including:
/// - Root directory write-once semantics
/// - Idempotent enable / no-op disable
/// - Status notifications tied to session termination
/// - Log file content, blob extraction and checkpointing
///
use std::path::{Path, PathBuf};
use std::time::Duration;
use telemetry_gateway::recorder::{RecordFormat, BLOB_DIRECTORY};
use telemetry_gateway::{Field, FieldValue, Gateway, Record, SessionSettings, StatusStream};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

fn create_gateway(checkpoint_interval: Duration) -> Gateway {
    Gateway::new(SessionSettings {
        checkpoint_interval,
        format: RecordFormat::default(),
    })
}

async fn create_recording_gateway(checkpoint_interval: Duration) -> (Gateway, TempDir) {
    let dir = TempDir::new().unwrap();
    let gateway = create_gateway(checkpoint_interval);
    gateway.set_root_record_directory(dir.path()).await.unwrap();
    (gateway, dir)
}

fn temp(value: f64) -> Record {
    Record::new("A.B.C", vec![Field::new("temp", FieldValue::Double(value))])
}

/// Wait until the status stream reports `channel` as not recording
async fn wait_until_stopped(stream: &mut StatusStream, channel: &str) {
    tokio::time::timeout(TIMEOUT, async {
        while let Some(status) = stream.recv().await {
            if !status.is_recording(channel) {
                return;
            }
        }
        panic!("status stream closed");
    })
    .await
    .expect("recording did not stop in time");
}

async fn stop_recording(gateway: &Gateway, channel: &str) {
    let mut status = gateway.open_recording_status_stream();
    gateway.disable_recording(channel);
    wait_until_stopped(&mut status, channel).await;
}

fn log_files(channel_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(channel_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|e| e == "log").unwrap_or(false))
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

async fn wait_for_log_file(channel_dir: &Path) -> PathBuf {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if let Some(path) = log_files(channel_dir).pop() {
                return path;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("log file was not created")
}

async fn wait_for_lines(path: &Path, count: usize) -> String {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let content = std::fs::read_to_string(path).unwrap_or_default();
            if content.lines().count() >= count {
                return content;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("lines were not written in time")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concrete_scenario_single_line() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(10)).await;

    // value already cached before recording starts is not part of the recording
    gateway.bus().publish(temp(20.0));

    gateway.enable_recording("A.B.C").unwrap();
    gateway.bus().publish(temp(21.5));
    stop_recording(&gateway, "A.B.C").await;

    let files = log_files(&dir.path().join("A.B.C"));
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(content, "{\"temp\":21.5}\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_enable_twice_creates_one_session() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(10)).await;

    gateway.enable_recording("X").unwrap();
    gateway.enable_recording("X").unwrap();
    assert!(gateway.recordings().is_recording("X"));
    assert_eq!(gateway.bus().subscriber_count("X"), 1);

    stop_recording(&gateway, "X").await;
    assert_eq!(log_files(&dir.path().join("X")).len(), 1);
}

#[tokio::test]
async fn test_disable_without_session_is_noop() {
    let (gateway, _dir) = create_recording_gateway(Duration::from_secs(10)).await;
    gateway.disable_recording("never-enabled");
    assert!(gateway.current_recording_status().recording_channel_names.is_empty());
}

#[tokio::test]
async fn test_enable_without_root_is_noop() {
    let gateway = create_gateway(Duration::from_secs(10));
    gateway.enable_recording("X").unwrap();
    assert!(!gateway.recordings().is_recording("X"));
    assert_eq!(gateway.bus().subscriber_count("X"), 0);
}

#[tokio::test]
async fn test_enable_rejects_path_like_channel() {
    let (gateway, _dir) = create_recording_gateway(Duration::from_secs(10)).await;
    assert!(gateway.enable_recording("../escape").is_err());
    assert!(!gateway.recordings().is_recording("../escape"));
}

#[tokio::test]
async fn test_root_directory_first_set_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let gateway = create_gateway(Duration::from_secs(10));

    assert!(!gateway.has_record_directory());
    gateway.set_root_record_directory(first.path()).await.unwrap();
    gateway.set_root_record_directory(second.path()).await.unwrap();

    assert!(gateway.has_record_directory());
    assert_eq!(gateway.recordings().root_directory(), Some(first.path()));
}

#[tokio::test]
async fn test_root_directory_must_exist() {
    let dir = TempDir::new().unwrap();
    let gateway = create_gateway(Duration::from_secs(10));

    let missing = dir.path().join("missing");
    assert!(gateway.set_root_record_directory(&missing).await.is_err());
    assert!(!gateway.has_record_directory());

    let file = dir.path().join("file");
    std::fs::write(&file, b"x").unwrap();
    assert!(gateway.set_root_record_directory(&file).await.is_err());
    assert!(!gateway.has_record_directory());

    // a failed attempt does not consume the one allowed set
    gateway.set_root_record_directory(dir.path()).await.unwrap();
    assert!(gateway.has_record_directory());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_stream_follows_transitions() {
    let dir = TempDir::new().unwrap();
    let gateway = create_gateway(Duration::from_secs(10));
    let mut status = gateway.open_recording_status_stream();

    let initial = status.recv().await.unwrap();
    assert!(!initial.directory_is_set);
    assert!(initial.recording_channel_names.is_empty());

    gateway.set_root_record_directory(dir.path()).await.unwrap();
    assert!(gateway.current_recording_status().directory_is_set);
    let after_set = status.recv().await.unwrap();
    assert!(after_set.directory_is_set);

    gateway.enable_recording("X").unwrap();
    assert!(gateway.current_recording_status().is_recording("X"));
    let after_enable = status.recv().await.unwrap();
    assert!(after_enable.is_recording("X"));

    gateway.disable_recording("X");
    wait_until_stopped(&mut status, "X").await;
    assert!(!gateway.current_recording_status().is_recording("X"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_log_reconstructs_records_and_blobs() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(10)).await;
    gateway.enable_recording("CAM").unwrap();

    let blob = vec![0u8, 1, 2, 254, 255];
    gateway.bus().publish(Record::new(
        "CAM",
        vec![
            Field::new("frame", FieldValue::Integer(1)),
            Field::new("@blob", FieldValue::Bytes(blob.clone())),
            Field::new("mode", FieldValue::Enum("NOMINAL".to_string())),
            Field::new("mode@RAW", FieldValue::Integer(3)),
        ],
    ));
    gateway.bus().publish(Record::new(
        "CAM",
        vec![
            Field::new("frame", FieldValue::Integer(2)),
            Field::new("label", FieldValue::String("two".to_string())),
        ],
    ));
    stop_recording(&gateway, "CAM").await;

    let channel_dir = dir.path().join("CAM");
    let files = log_files(&channel_dir);
    assert_eq!(files.len(), 1);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    let lines: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);

    let first = lines[0].as_object().unwrap();
    let keys: Vec<&str> = first.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["frame", "@blob", "mode"]);
    assert_eq!(first["frame"], 1);
    assert_eq!(first["mode"], "NOMINAL");

    let blob_name = first["@blob"].as_str().unwrap();
    assert!(blob_name.ends_with(".dat"));
    let stored = std::fs::read(channel_dir.join(BLOB_DIRECTORY).join(blob_name)).unwrap();
    assert_eq!(stored, blob);

    assert_eq!(lines[1], serde_json::json!({"frame": 2, "label": "two"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_checkpoint_never_loses_lines() {
    let (gateway, dir) = create_recording_gateway(Duration::ZERO).await;
    gateway.enable_recording("A.B.C").unwrap();
    let log = wait_for_log_file(&dir.path().join("A.B.C")).await;

    gateway.bus().publish(temp(1.0));
    let before = wait_for_lines(&log, 1).await;

    gateway.bus().publish(temp(2.0));
    gateway.bus().publish(temp(3.0));
    let after = wait_for_lines(&log, 3).await;
    assert!(after.starts_with(&before));

    stop_recording(&gateway, "A.B.C").await;
    let finished = std::fs::read_to_string(&log).unwrap();
    assert_eq!(finished, after);
    assert_eq!(
        finished,
        "{\"temp\":1.0}\n{\"temp\":2.0}\n{\"temp\":3.0}\n"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reenable_after_stop_starts_new_log() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(10)).await;

    gateway.enable_recording("X").unwrap();
    stop_recording(&gateway, "X").await;

    gateway.enable_recording("X").unwrap();
    assert!(gateway.recordings().is_recording("X"));
    stop_recording(&gateway, "X").await;

    assert_eq!(log_files(&dir.path().join("X")).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_io_failure_ends_session() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(10)).await;

    // a file where the channel directory should go
    std::fs::write(dir.path().join("BROKEN"), b"not a directory").unwrap();

    gateway.enable_recording("BROKEN").unwrap();
    let mut status = gateway.open_recording_status_stream();
    wait_until_stopped(&mut status, "BROKEN").await;

    assert!(!gateway.recordings().is_recording("BROKEN"));
    assert_eq!(gateway.bus().subscriber_count("BROKEN"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_closes_all_sessions() {
    let (gateway, dir) = create_recording_gateway(Duration::from_secs(3600)).await;

    gateway.enable_recording("X").unwrap();
    gateway.enable_recording("Y").unwrap();
    gateway
        .bus()
        .publish(Record::new("X", vec![Field::new("v", FieldValue::Integer(1))]));
    gateway
        .bus()
        .publish(Record::new("Y", vec![Field::new("v", FieldValue::Integer(2))]));

    tokio::time::timeout(TIMEOUT, gateway.recordings().shutdown())
        .await
        .expect("shutdown did not finish");

    assert!(gateway.current_recording_status().recording_channel_names.is_empty());
    for (channel, expected) in [("X", "{\"v\":1}\n"), ("Y", "{\"v\":2}\n")] {
        let files = log_files(&dir.path().join(channel));
        assert_eq!(files.len(), 1);
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), expected);
    }

    gateway.enable_recording("Z").unwrap();
    assert!(!gateway.recordings().is_recording("Z"));
}
