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


// Shared recording state: the write-once root directory and the session
// registry (at most one session per channel).

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;

use crate::protocol::RecordingStatus;

#[derive(Debug)]
pub(crate) struct SessionHandle {
    pub id: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct RecorderState {
    root: OnceLock<PathBuf>,
    pub(crate) sessions: DashMap<String, SessionHandle>,
}

impl RecorderState {
    pub fn root_directory(&self) -> Option<&Path> {
        self.root.get().map(PathBuf::as_path)
    }

    /// Returns false when a root was already set; the existing one is kept.
    pub(crate) fn set_root_directory(&self, path: PathBuf) -> bool {
        self.root.set(path).is_ok()
    }

    pub fn is_recording(&self, channel: &str) -> bool {
        self.sessions.contains_key(channel)
    }

    pub fn current_status(&self) -> RecordingStatus {
        RecordingStatus {
            directory_is_set: self.root.get().is_some(),
            recording_channel_names: self.sessions.iter().map(|s| s.key().clone()).collect(),
        }
    }
}
