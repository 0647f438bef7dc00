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


// Local telemetry gateway
//
// Sits between one upstream telemetry broker and many local consumers:
// - Multiplexes a single reconnecting upstream connection
// - Keeps the latest record per channel and fans records out to subscribers
// - Records selected channels to checkpointed newline-delimited JSON logs
// - Serves a small call/reply surface, including cancellable live streams

pub mod bus;
pub mod cache;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod recorder;
pub mod upstream;

// Re-export main types
pub use bus::{ChannelBus, Subscription};
pub use cache::LatestValueCache;
pub use config::{load_config, load_config_with_env, GatewayConfig};
pub use control::ControlInterface;
pub use dispatcher::{Call, ClientConnection, Dispatcher, GatewayClient, Procedure, Reply, ReplyValue};
pub use error::GatewayError;
pub use gateway::Gateway;
pub use protocol::{Field, FieldValue, Record, RecordingStatus, UpstreamFrame};
pub use recorder::{RecordingManager, SessionSettings, StatusNotifier, StatusStream};
pub use upstream::{IngestLoop, IngestState, TcpJsonSource, TelemetrySource, TelemetryStream};
