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


// Recorder module
//
// - `RecordingManager`: at most one session per channel, write-once root
// - `RecordingSession`: run loop writing one channel to a checkpointed log
// - `StatusNotifier`: pushes `RecordingStatus` snapshots to listeners
// - `writer`: file layout, record flattening, blob extraction

pub mod manager;
pub mod notifier;
pub mod session;
mod state;
pub mod writer;

pub use manager::RecordingManager;
pub use notifier::{ListenerId, StatusListener, StatusNotifier, StatusStream};
pub use session::{RecordingSession, SessionSettings};
pub use state::RecorderState;
pub use writer::{flatten_record, BlobStore, LogFile, RecordFormat, BLOB_DIRECTORY};
