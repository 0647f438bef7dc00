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


// Reconnecting ingest loop
//
// connecting -> streaming -> backoff -> connecting ...
//
// Errors never leave this loop; consumers only observe that records stop
// and later resume.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::source::{TelemetrySource, TelemetryStream};
use crate::bus::ChannelBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestState {
    Connecting,
    Streaming,
    Backoff,
}

pub struct IngestLoop {
    source: Arc<dyn TelemetrySource>,
    bus: Arc<ChannelBus>,
    reconnect_delay: Duration,
    state_tx: watch::Sender<IngestState>,
}

impl IngestLoop {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        bus: Arc<ChannelBus>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, _) = watch::channel(IngestState::Connecting);
        Self {
            source,
            bus,
            reconnect_delay,
            state_tx,
        }
    }

    /// Observe state transitions of the loop
    pub fn state(&self) -> watch::Receiver<IngestState> {
        self.state_tx.subscribe()
    }

    /// Run on the current runtime for the lifetime of the process
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!("Starting ingest loop from {}", self.source.describe());
        loop {
            self.state_tx.send_replace(IngestState::Connecting);
            match self.stream_once().await {
                Ok(count) => info!(
                    "Upstream stream ended after {} records, reconnecting in {:?}",
                    count, self.reconnect_delay
                ),
                Err(e) => warn!(
                    "Upstream stream failed: {:#}. Reconnecting in {:?}",
                    e, self.reconnect_delay
                ),
            }
            self.state_tx.send_replace(IngestState::Backoff);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn stream_once(&self) -> Result<u64> {
        let mut stream = self.source.open().await?;
        self.state_tx.send_replace(IngestState::Streaming);
        self.pump(stream.as_mut()).await
    }

    async fn pump(&self, stream: &mut dyn TelemetryStream) -> Result<u64> {
        let mut count = 0u64;
        while let Some(record) = stream.next_record().await? {
            debug!("Ingested record for channel '{}'", record.name);
            self.bus.publish(record);
            count += 1;
        }
        Ok(count)
    }
}
