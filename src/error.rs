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


use thiserror::Error;

/// Failures reported back to a single caller through its reply
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown procedure: {0}")]
    UnknownProcedure(String),

    #[error("invalid arguments for '{procedure}': {reason}")]
    InvalidArguments { procedure: String, reason: String },

    #[error("{procedure} failed: {source}")]
    ProcedureFailed {
        procedure: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{procedure} panicked: {message}")]
    Panicked { procedure: String, message: String },

    #[error("gateway is not accepting calls")]
    Disconnected,

    #[error("reply channel closed before a reply was delivered")]
    NoReply,

    #[error("procedure '{procedure}' returned {actual}, expected {expected}")]
    UnexpectedReply {
        procedure: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl GatewayError {
    pub fn invalid_arguments(procedure: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            procedure: procedure.to_string(),
            reason: reason.into(),
        }
    }
}
