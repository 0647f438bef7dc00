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


// Upstream module
//
// Owns the single connection to the telemetry broker:
// - `TelemetrySource`: trait seam for opening the upstream record stream
// - `TcpJsonSource`: newline-delimited JSON frames over TCP
// - `IngestLoop`: reconnecting loop feeding the cache and the bus

pub mod ingest;
pub mod source;
pub mod tcp;

pub use ingest::{IngestLoop, IngestState};
pub use source::{TelemetrySource, TelemetryStream};
pub use tcp::TcpJsonSource;
