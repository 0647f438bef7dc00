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


// Gateway context
//
// Single explicitly constructed owner of the cache, the bus and the
// recording manager. Every component receives it (or a part of it) by
// reference; there is no global state.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::bus::{ChannelBus, Subscription};
use crate::cache::LatestValueCache;
use crate::config::GatewayConfig;
use crate::protocol::{Record, RecordingStatus};
use crate::recorder::{RecordFormat, RecordingManager, SessionSettings, StatusStream};
use crate::upstream::{IngestLoop, TelemetrySource};

pub struct Gateway {
    bus: Arc<ChannelBus>,
    recordings: RecordingManager,
    schema: Option<Value>,
}

impl Gateway {
    pub fn new(settings: SessionSettings) -> Self {
        let bus = Arc::new(ChannelBus::new(Arc::new(LatestValueCache::new())));
        Self {
            recordings: RecordingManager::new(bus.clone(), settings),
            bus,
            schema: None,
        }
    }

    /// Build the gateway described by `config`, loading the schema document
    /// if one is configured.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self> {
        let settings = SessionSettings {
            checkpoint_interval: config.recording.checkpoint_interval(),
            format: RecordFormat {
                blob_field: config.recording.blob_field.clone(),
                raw_suffix: config.recording.raw_suffix.clone(),
            },
        };
        let mut gateway = Self::new(settings);

        if let Some(path) = &config.schema.path {
            let content = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read schema {}", path.display()))?;
            let schema = serde_json::from_slice(&content)
                .with_context(|| format!("Failed to parse schema {}", path.display()))?;
            info!("Loaded channel schema from {}", path.display());
            gateway.schema = Some(schema);
        }

        Ok(gateway)
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn bus(&self) -> &Arc<ChannelBus> {
        &self.bus
    }

    pub fn recordings(&self) -> &RecordingManager {
        &self.recordings
    }

    /// Ingest loop feeding this gateway from `source`
    pub fn ingest_loop(
        &self,
        source: Arc<dyn TelemetrySource>,
        reconnect_delay: std::time::Duration,
    ) -> IngestLoop {
        IngestLoop::new(source, self.bus.clone(), reconnect_delay)
    }

    pub fn open_telemetry_stream(&self, channel: &str) -> Subscription {
        self.bus.subscribe(channel)
    }

    pub fn last_telemetry_value(&self, channel: &str) -> Option<Arc<Record>> {
        self.bus.cache().get(channel)
    }

    pub async fn set_root_record_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        self.recordings.set_root_directory(path).await
    }

    pub fn has_record_directory(&self) -> bool {
        self.recordings.has_root_directory()
    }

    pub fn enable_recording(&self, channel: &str) -> Result<()> {
        self.recordings.enable_recording(channel)
    }

    pub fn disable_recording(&self, channel: &str) {
        self.recordings.disable_recording(channel)
    }

    pub fn open_recording_status_stream(&self) -> StatusStream {
        self.recordings.subscribe_status()
    }

    pub fn current_recording_status(&self) -> RecordingStatus {
        self.recordings.current_status()
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}
