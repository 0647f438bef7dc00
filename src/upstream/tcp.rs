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


// TCP source: one JSON frame per line, `{"tmiv": Record}`

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info};

use super::source::{TelemetrySource, TelemetryStream};
use crate::config::UpstreamConfig;
use crate::protocol::{Record, UpstreamFrame};

/// Longest frame accepted from the broker by default
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

pub struct TcpJsonSource {
    address: String,
    connect_timeout: Duration,
    max_frame_length: usize,
}

impl TcpJsonSource {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }

    /// A frame longer than this is a stream error and ends the connection
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self::new(config.address.clone(), config.connect_timeout())
    }
}

#[async_trait]
impl TelemetrySource for TcpJsonSource {
    async fn open(&self) -> Result<Box<dyn TelemetryStream>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .with_context(|| format!("Timed out connecting to {}", self.address))?
            .with_context(|| format!("Failed to connect to {}", self.address))?;

        info!("Connected to upstream broker at {}", self.address);

        Ok(Box::new(TcpJsonStream {
            lines: FramedRead::new(stream, LinesCodec::new_with_max_length(self.max_frame_length)),
        }))
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

struct TcpJsonStream {
    lines: FramedRead<TcpStream, LinesCodec>,
}

#[async_trait]
impl TelemetryStream for TcpJsonStream {
    async fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(line) = self.lines.next().await else {
                return Ok(None);
            };
            let line = line.context("Failed to read from upstream")?;

            if line.trim().is_empty() {
                continue;
            }

            let frame: UpstreamFrame =
                serde_json::from_str(&line).context("Malformed upstream frame")?;
            match frame.tmiv {
                Some(record) => return Ok(Some(record)),
                None => debug!("Skipping upstream frame without record"),
            }
        }
    }
}
