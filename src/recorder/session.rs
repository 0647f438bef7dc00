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


// Recording session run loop: one channel, one log file

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::writer::{flatten_record, BlobStore, LogFile, RecordFormat};
use crate::bus::Subscription;
use crate::protocol::{FieldValue, Record};

/// Settings shared by every session of a manager
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub checkpoint_interval: Duration,
    pub format: RecordFormat,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval: Duration::from_secs(10),
            format: RecordFormat::default(),
        }
    }
}

pub struct RecordingSession {
    channel: String,
    root: PathBuf,
    subscription: Subscription,
    cancel: CancellationToken,
    settings: Arc<SessionSettings>,
}

impl RecordingSession {
    pub fn new(
        root: PathBuf,
        subscription: Subscription,
        cancel: CancellationToken,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            channel: subscription.channel().to_string(),
            root,
            subscription,
            cancel,
            settings,
        }
    }

    /// Record until cancelled. Returns the number of records written.
    ///
    /// The log file is closed before this returns, whether the loop ended
    /// normally or on an I/O error.
    pub async fn run(mut self) -> Result<u64> {
        let channel_dir = self.root.join(&self.channel);
        fs::create_dir_all(&channel_dir)
            .await
            .with_context(|| format!("Failed to create {}", channel_dir.display()))?;

        let mut log = LogFile::create(&channel_dir, self.settings.checkpoint_interval).await?;
        let blobs = BlobStore::new(&channel_dir);

        info!(
            "Recording channel '{}' to {}",
            self.channel,
            log.path().display()
        );

        let result = self.record(&mut log, &blobs).await;
        let closed = log.close().await;
        let written = result?;
        closed?;
        Ok(written)
    }

    async fn record(&mut self, log: &mut LogFile, blobs: &BlobStore) -> Result<u64> {
        let mut written = 0u64;
        let mut stopping = false;
        loop {
            let next = if stopping {
                self.subscription.recv().await
            } else {
                tokio::select! {
                    next = self.subscription.recv() => next,
                    _ = self.cancel.cancelled() => {
                        // no new deliveries; drain what was published before the stop
                        debug!("Stopping recording of '{}'", self.channel);
                        self.subscription.cancel();
                        stopping = true;
                        continue;
                    }
                }
            };

            let Some(record) = next else {
                break;
            };

            self.write(&record, log, blobs).await?;
            written += 1;
            log.maybe_checkpoint().await?;
        }
        Ok(written)
    }

    async fn write(&self, record: &Record, log: &mut LogFile, blobs: &BlobStore) -> Result<()> {
        let format = &self.settings.format;
        let blob_file_name = match record.field(&format.blob_field) {
            Some(field) => match &field.value {
                FieldValue::Bytes(bytes) => Some(blobs.store(bytes).await?),
                _ => None,
            },
            None => None,
        };

        let object = flatten_record(record, format, blob_file_name.as_deref());
        let mut line = serde_json::to_vec(&object).context("Failed to serialize record")?;
        line.push(b'\n');
        log.append(&line).await
    }
}
