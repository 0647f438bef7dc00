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

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Typed value carried by a telemetry field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Integer(i64),
    Double(f64),
    String(String),
    /// Enum label as converted by the broker
    Enum(String),
    Bytes(Vec<u8>),
}

/// A single named field of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One telemetry sample: the channel it belongs to and its ordered fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Frame received from the upstream broker.
///
/// The broker interleaves keep-alive frames without a record; those are
/// skipped by the ingest loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamFrame {
    #[serde(default)]
    pub tmiv: Option<Record>,
}

/// Recording status snapshot, recomputed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStatus {
    pub directory_is_set: bool,
    pub recording_channel_names: BTreeSet<String>,
}

impl RecordingStatus {
    pub fn is_recording(&self, channel: &str) -> bool {
        self.recording_channel_names.contains(channel)
    }
}
