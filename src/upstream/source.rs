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


// Upstream source trait

use anyhow::Result;
use async_trait::async_trait;

use crate::protocol::Record;

/// A connection factory for the upstream telemetry broker.
///
/// Each call to `open` establishes a fresh stream. The ingest loop calls it
/// again after every disconnect.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn open(&self) -> Result<Box<dyn TelemetryStream>>;

    /// Human readable endpoint, used in logs
    fn describe(&self) -> String;
}

/// An open upstream stream of records
#[async_trait]
pub trait TelemetryStream: Send {
    /// Next record. `Ok(None)` means the broker ended the stream cleanly.
    async fn next_record(&mut self) -> Result<Option<Record>>;
}
