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


// Configuration system integration tests

use std::fs;
use std::path::PathBuf;
use telemetry_gateway::config::{load_config, load_config_with_env, GatewayConfig};
use telemetry_gateway::Gateway;
use tempfile::TempDir;

#[test]
fn test_load_default_config() {
    let config_path = PathBuf::from("config/default.yaml");

    if config_path.exists() {
        let result = load_config(&config_path);
        assert!(result.is_ok(), "Failed to load default config: {:?}", result.err());

        let config = result.unwrap();

        // Verify defaults
        assert_eq!(config.upstream.reconnect_delay_ms, 1000);
        assert_eq!(config.recording.checkpoint_interval_seconds, 10);
        assert_eq!(config.recording.blob_field, "@blob");
        assert_eq!(config.recording.raw_suffix, "@RAW");
        assert_eq!(config.control.listen.as_deref(), Some("127.0.0.1:7701"));
        assert_eq!(config.logging.level, "info");
    }
}

#[test]
fn test_config_with_env_vars() {
    let temp_config = r#"
upstream:
  address: ${GATEWAY_IT_BROKER:-broker.local:7700}
  reconnect_delay_ms: 250

recording:
  root_directory: ${GATEWAY_IT_ROOT:-/data/recordings}
  channels: ["HK.PCDU", "HK.OBC"]
  checkpoint_interval_seconds: 5

logging:
  level: debug
"#;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gateway.yaml");
    fs::write(&path, temp_config).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.upstream.address, "broker.local:7700");
    assert_eq!(config.upstream.reconnect_delay_ms, 250);
    assert_eq!(
        config.recording.root_directory,
        Some(PathBuf::from("/data/recordings"))
    );
    assert_eq!(config.recording.channels, vec!["HK.PCDU", "HK.OBC"]);
    assert_eq!(config.recording.checkpoint_interval_seconds, 5);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "upstream:\n  address: \"\"\n").unwrap();
    assert!(load_config(&path).is_err());

    assert!(load_config(dir.path().join("missing.yaml")).is_err());
}

#[test]
fn test_env_override_of_upstream() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gateway.yaml");
    fs::write(&path, "upstream:\n  address: 10.1.1.1:7700\n").unwrap();

    std::env::set_var("GATEWAY_UPSTREAM", "10.2.2.2:7700");
    let config = load_config_with_env(&path).unwrap();
    std::env::remove_var("GATEWAY_UPSTREAM");

    assert_eq!(config.upstream.address, "10.2.2.2:7700");
}

#[tokio::test]
async fn test_gateway_loads_schema() {
    let dir = TempDir::new().unwrap();
    let schema_path = dir.path().join("schema.json");
    fs::write(&schema_path, r#"{"telemetries": [{"name": "HK.PCDU"}]}"#).unwrap();

    let mut config = GatewayConfig::default();
    config.schema.path = Some(schema_path);
    let gateway = Gateway::from_config(&config).await.unwrap();
    assert_eq!(
        gateway.schema().unwrap()["telemetries"][0]["name"],
        "HK.PCDU"
    );

    config.schema.path = Some(dir.path().join("missing.json"));
    assert!(Gateway::from_config(&config).await.is_err());
}
