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


// On-disk representation of a recording
//
// root/<channel>/<millis>.log          newline-delimited JSON, one object per record
// root/<channel>/blob_data/<millis>.dat  raw bytes of extracted blob fields

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::protocol::{FieldValue, Record};

pub const BLOB_DIRECTORY: &str = "blob_data";

/// Rules deciding how a record is persisted
#[derive(Debug, Clone)]
pub struct RecordFormat {
    pub blob_field: String,
    pub raw_suffix: String,
}

impl Default for RecordFormat {
    fn default() -> Self {
        Self {
            blob_field: "@blob".to_string(),
            raw_suffix: "@RAW".to_string(),
        }
    }
}

impl RecordFormat {
    pub fn is_raw(&self, field_name: &str) -> bool {
        field_name.ends_with(&self.raw_suffix)
    }
}

/// Flatten a record into a `name -> value` JSON object.
///
/// Raw shadow fields are dropped. The blob field, if present, is replaced by
/// `blob_file_name` (empty when nothing was extracted). Field order is kept.
pub fn flatten_record(
    record: &Record,
    format: &RecordFormat,
    blob_file_name: Option<&str>,
) -> Map<String, Value> {
    let mut object = Map::new();
    for field in &record.fields {
        if format.is_raw(&field.name) {
            continue;
        }
        let value = if field.name == format.blob_field {
            Value::String(blob_file_name.unwrap_or_default().to_string())
        } else {
            field_value_to_json(&field.value)
        };
        object.insert(field.name.clone(), value);
    }
    object
}

fn field_value_to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Integer(i) => Value::from(*i),
        // non-finite doubles become null
        FieldValue::Double(d) => Value::from(*d),
        FieldValue::String(s) | FieldValue::Enum(s) => Value::String(s.clone()),
        FieldValue::Bytes(b) => Value::from(b.clone()),
    }
}

/// Create `<dir>/<millis>.<extension>` without ever replacing an existing
/// file; on collision the next millisecond is tried.
async fn create_timestamped(dir: &Path, extension: &str) -> Result<(PathBuf, File)> {
    let mut millis = Utc::now().timestamp_millis();
    loop {
        let path = dir.join(format!("{}.{}", millis, extension));
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => millis += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()))
            }
        }
    }
}

/// Side files for blob fields of one channel
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(channel_dir: &Path) -> Self {
        Self {
            dir: channel_dir.join(BLOB_DIRECTORY),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a new file and return its name, relative to the
    /// blob directory.
    pub async fn store(&self, bytes: &[u8]) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let (path, mut file) = create_timestamped(&self.dir, "dat").await?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write blob {}", path.display()))?;
        file.flush().await.context("Failed to flush blob")?;

        debug!("Stored {} blob bytes in {}", bytes.len(), path.display());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(name)
    }
}

/// Append-only log file with periodic checkpoints.
///
/// A checkpoint closes the handle so every buffered byte reaches the disk,
/// measures the file, then reopens it without truncation and seeks to the
/// measured end.
pub struct LogFile {
    path: PathBuf,
    writer: BufWriter<File>,
    checkpoint_interval: Duration,
    last_checkpoint: Instant,
}

impl LogFile {
    pub async fn create(dir: &Path, checkpoint_interval: Duration) -> Result<Self> {
        let (path, file) = create_timestamped(dir, "log").await?;
        debug!("Opened recording log {}", path.display());
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            checkpoint_interval,
            last_checkpoint: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .await
            .with_context(|| format!("Failed to append to {}", self.path.display()))
    }

    /// Checkpoint if the interval has elapsed. Returns whether it did.
    pub async fn maybe_checkpoint(&mut self) -> Result<bool> {
        if self.last_checkpoint.elapsed() < self.checkpoint_interval {
            return Ok(false);
        }
        self.checkpoint().await?;
        Ok(true)
    }

    pub async fn checkpoint(&mut self) -> Result<()> {
        Self::close_writer(&mut self.writer).await?;

        let size = fs::metadata(&self.path)
            .await
            .with_context(|| format!("Failed to stat {}", self.path.display()))?
            .len();

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to reopen {}", self.path.display()))?;
        file.seek(SeekFrom::Start(size))
            .await
            .context("Failed to seek to end of log")?;

        self.writer = BufWriter::new(file);
        self.last_checkpoint = Instant::now();

        debug!("Checkpointed {} at {} bytes", self.path.display(), size);
        Ok(())
    }

    pub async fn close(mut self) -> Result<()> {
        Self::close_writer(&mut self.writer).await
    }

    async fn close_writer(writer: &mut BufWriter<File>) -> Result<()> {
        writer.flush().await.context("Failed to flush log")?;
        writer
            .get_mut()
            .sync_all()
            .await
            .context("Failed to sync log")?;
        Ok(())
    }
}
