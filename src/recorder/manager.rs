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


// Recording manager
//
// Owns the root directory and the session registry, starts and stops
// recording sessions and drives the status notifier.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use super::notifier::{StatusNotifier, StatusStream};
use super::session::{RecordingSession, SessionSettings};
use super::state::{RecorderState, SessionHandle};
use crate::bus::ChannelBus;
use crate::protocol::RecordingStatus;

pub struct RecordingManager {
    state: Arc<RecorderState>,
    notifier: Arc<StatusNotifier>,
    bus: Arc<ChannelBus>,
    settings: Arc<SessionSettings>,
    tracker: TaskTracker,
    next_session_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl RecordingManager {
    pub fn new(bus: Arc<ChannelBus>, settings: SessionSettings) -> Self {
        let state = Arc::new(RecorderState::default());
        Self {
            notifier: Arc::new(StatusNotifier::new(state.clone())),
            state,
            bus,
            settings: Arc::new(settings),
            tracker: TaskTracker::new(),
            next_session_id: AtomicU64::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn notifier(&self) -> &Arc<StatusNotifier> {
        &self.notifier
    }

    pub fn current_status(&self) -> RecordingStatus {
        self.state.current_status()
    }

    pub fn subscribe_status(&self) -> StatusStream {
        self.notifier.subscribe()
    }

    pub fn root_directory(&self) -> Option<&Path> {
        self.state.root_directory()
    }

    pub fn has_root_directory(&self) -> bool {
        self.state.root_directory().is_some()
    }

    pub fn is_recording(&self, channel: &str) -> bool {
        self.state.is_recording(channel)
    }

    /// Set the root directory for recordings.
    ///
    /// Only the first successful call takes effect; later calls are ignored.
    /// The path must name an existing directory.
    pub async fn set_root_directory(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(current) = self.state.root_directory() {
            debug!(
                "Root directory already set to {}, ignoring {}",
                current.display(),
                path.display()
            );
            return Ok(());
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Cannot access {}", path.display()))?;
        if !metadata.is_dir() {
            bail!("{} is not a directory", path.display());
        }

        if self.state.set_root_directory(path.to_path_buf()) {
            info!("Recording root directory set to {}", path.display());
            self.notifier.notify_all();
        }
        Ok(())
    }

    /// Start recording `channel`. No-op without a root directory or when the
    /// channel is already being recorded.
    pub fn enable_recording(&self, channel: &str) -> Result<()> {
        if !is_valid_channel_name(channel) {
            bail!("'{}' cannot be used as a recording directory name", channel);
        }
        let Some(root) = self.state.root_directory() else {
            debug!("No root directory set, not recording '{}'", channel);
            return Ok(());
        };
        if self.shutting_down.load(Ordering::Acquire) {
            debug!("Shutting down, not recording '{}'", channel);
            return Ok(());
        }

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let session = match self.state.sessions.entry(channel.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!("Channel '{}' is already being recorded", channel);
                return Ok(());
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let session = RecordingSession::new(
                    root.to_path_buf(),
                    self.bus.subscribe_live(channel),
                    cancel.clone(),
                    self.settings.clone(),
                );
                entry.insert(SessionHandle { id, cancel });
                session
            }
        };

        let state = self.state.clone();
        let notifier = self.notifier.clone();
        let channel = channel.to_string();
        self.tracker.spawn(async move {
            match session.run().await {
                Ok(written) => info!(
                    "Recording of '{}' stopped after {} records",
                    channel, written
                ),
                Err(e) => error!("Recording of '{}' failed: {:#}", channel, e),
            }
            state.sessions.remove_if(&channel, |_, handle| handle.id == id);
            notifier.notify_all();
        });

        self.notifier.notify_all();
        Ok(())
    }

    /// Ask the session for `channel` to stop. Deregistration and the status
    /// notification happen once its log file is closed.
    pub fn disable_recording(&self, channel: &str) {
        match self.state.sessions.get(channel) {
            Some(handle) => handle.cancel.cancel(),
            None => debug!("Channel '{}' is not being recorded", channel),
        }
    }

    /// Stop every session and wait until each one has closed its file.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        for handle in self.state.sessions.iter() {
            handle.cancel.cancel();
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("All recording sessions stopped");
    }
}

/// Channel names become directory names under the root
pub(crate) fn is_valid_channel_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_validation() {
        assert!(is_valid_channel_name("A.B.C"));
        assert!(is_valid_channel_name("HK.PCDU@1"));
        assert!(!is_valid_channel_name(""));
        assert!(!is_valid_channel_name(".."));
        assert!(!is_valid_channel_name("a/b"));
        assert!(!is_valid_channel_name("a\\b"));
        assert!(!is_valid_channel_name("a\0b"));
    }
}
