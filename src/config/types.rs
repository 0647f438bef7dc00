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


// Configuration types for the telemetry gateway

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream telemetry broker connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// host:port of the broker's telemetry stream
    #[serde(default = "default_upstream_address")]
    pub address: String,

    /// Delay between a disconnect and the next connection attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: default_upstream_address(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordingConfig {
    /// Root directory for recordings. Can also be set once at runtime.
    #[serde(default)]
    pub root_directory: Option<PathBuf>,

    /// Channels to start recording as soon as the gateway is up
    #[serde(default)]
    pub channels: Vec<String>,

    #[serde(default = "default_checkpoint_interval_seconds")]
    pub checkpoint_interval_seconds: u64,

    /// Field whose bytes are extracted to `blob_data/`
    #[serde(default = "default_blob_field")]
    pub blob_field: String,

    /// Name suffix marking unconverted shadow fields, never persisted
    #[serde(default = "default_raw_suffix")]
    pub raw_suffix: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            root_directory: None,
            channels: Vec::new(),
            checkpoint_interval_seconds: default_checkpoint_interval_seconds(),
            blob_field: default_blob_field(),
            raw_suffix: default_raw_suffix(),
        }
    }
}

impl RecordingConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_seconds)
    }
}

/// Local control socket
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ControlConfig {
    /// e.g. "127.0.0.1:7701". The socket is disabled when unset.
    #[serde(default)]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    /// JSON document describing channels and commands, served read-only
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_upstream_address() -> String { "127.0.0.1:7700".to_string() }
fn default_reconnect_delay_ms() -> u64 { 1000 }
fn default_connect_timeout_ms() -> u64 { 5000 }
fn default_checkpoint_interval_seconds() -> u64 { 10 }
fn default_blob_field() -> String { "@blob".to_string() }
fn default_raw_suffix() -> String { "@RAW".to_string() }
fn default_log_level() -> String { "info".to_string() }
