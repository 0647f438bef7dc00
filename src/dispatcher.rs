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


// Call dispatcher
//
// Any number of client connections submit calls. Connections are served
// concurrently; calls on one connection run one at a time in submission
// order. Each call gets exactly one reply on its own callback channel. A
// failing or panicking procedure only affects the reply of that call.
//
// Stream results (telemetry, recording status) are moved into the reply,
// so the caller owns them outright; dropping the reply cancels them.

use serde_json::Value;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::bus::Subscription;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::protocol::{Record, RecordingStatus};
use crate::recorder::StatusStream;

/// Successful result of a call
#[derive(Debug)]
pub enum ReplyValue {
    Json(Value),
    TelemetryStream(Subscription),
    StatusStream(StatusStream),
}

impl ReplyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ReplyValue::Json(_) => "a value",
            ReplyValue::TelemetryStream(_) => "a telemetry stream",
            ReplyValue::StatusStream(_) => "a status stream",
        }
    }
}

pub type Reply = Result<ReplyValue, GatewayError>;

/// A call frame: procedure name, arguments and the callback for the reply
pub struct Call {
    pub procedure: String,
    pub args: Vec<Value>,
    pub callback: oneshot::Sender<Reply>,
}

/// The fixed set of procedures the gateway serves
#[derive(Debug, Clone, PartialEq)]
pub enum Procedure {
    OpenTelemetryStream(String),
    LastTelemetryValue(String),
    SetRootRecordDirectory(PathBuf),
    HasRecordDirectory,
    EnableRecording(String),
    DisableRecording(String),
    OpenRecordingStatusStream,
    CurrentRecordingStatus,
    GetSchema,
}

impl Procedure {
    pub fn parse(name: &str, args: &[Value]) -> Result<Self, GatewayError> {
        let procedure = match name {
            "openTelemetryStream" => Procedure::OpenTelemetryStream(string_arg(name, args)?),
            "lastTelemetryValue" => Procedure::LastTelemetryValue(string_arg(name, args)?),
            "setRootRecordDirectory" => {
                Procedure::SetRootRecordDirectory(PathBuf::from(string_arg(name, args)?))
            }
            "hasRecordDirectory" => no_args(name, args, Procedure::HasRecordDirectory)?,
            "enableRecording" => Procedure::EnableRecording(string_arg(name, args)?),
            "disableRecording" => Procedure::DisableRecording(string_arg(name, args)?),
            "openRecordingStatusStream" => {
                no_args(name, args, Procedure::OpenRecordingStatusStream)?
            }
            "currentRecordingStatus" => no_args(name, args, Procedure::CurrentRecordingStatus)?,
            "getSchema" => no_args(name, args, Procedure::GetSchema)?,
            unknown => return Err(GatewayError::UnknownProcedure(unknown.to_string())),
        };
        Ok(procedure)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Procedure::OpenTelemetryStream(_) => "openTelemetryStream",
            Procedure::LastTelemetryValue(_) => "lastTelemetryValue",
            Procedure::SetRootRecordDirectory(_) => "setRootRecordDirectory",
            Procedure::HasRecordDirectory => "hasRecordDirectory",
            Procedure::EnableRecording(_) => "enableRecording",
            Procedure::DisableRecording(_) => "disableRecording",
            Procedure::OpenRecordingStatusStream => "openRecordingStatusStream",
            Procedure::CurrentRecordingStatus => "currentRecordingStatus",
            Procedure::GetSchema => "getSchema",
        }
    }

    pub async fn invoke(self, gateway: &Gateway) -> Reply {
        let name = self.name();
        let failed = |source: anyhow::Error| GatewayError::ProcedureFailed {
            procedure: name.to_string(),
            source,
        };

        let value = match self {
            Procedure::OpenTelemetryStream(channel) => {
                return Ok(ReplyValue::TelemetryStream(
                    gateway.open_telemetry_stream(&channel),
                ))
            }
            Procedure::OpenRecordingStatusStream => {
                return Ok(ReplyValue::StatusStream(
                    gateway.open_recording_status_stream(),
                ))
            }
            Procedure::LastTelemetryValue(channel) => match gateway.last_telemetry_value(&channel)
            {
                Some(record) => to_json(&*record).map_err(failed)?,
                None => Value::Null,
            },
            Procedure::SetRootRecordDirectory(path) => {
                gateway
                    .set_root_record_directory(&path)
                    .await
                    .map_err(failed)?;
                Value::Null
            }
            Procedure::HasRecordDirectory => Value::Bool(gateway.has_record_directory()),
            Procedure::EnableRecording(channel) => {
                gateway.enable_recording(&channel).map_err(failed)?;
                Value::Null
            }
            Procedure::DisableRecording(channel) => {
                gateway.disable_recording(&channel);
                Value::Null
            }
            Procedure::CurrentRecordingStatus => {
                to_json(&gateway.current_recording_status()).map_err(failed)?
            }
            Procedure::GetSchema => gateway.schema().cloned().unwrap_or(Value::Null),
        };
        Ok(ReplyValue::Json(value))
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn string_arg(procedure: &str, args: &[Value]) -> Result<String, GatewayError> {
    match args {
        [Value::String(s)] => Ok(s.clone()),
        [other] => Err(GatewayError::invalid_arguments(
            procedure,
            format!("expected a string, got {}", other),
        )),
        _ => Err(GatewayError::invalid_arguments(
            procedure,
            format!("expected 1 argument, got {}", args.len()),
        )),
    }
}

fn no_args(procedure: &str, args: &[Value], parsed: Procedure) -> Result<Procedure, GatewayError> {
    if args.is_empty() {
        Ok(parsed)
    } else {
        Err(GatewayError::invalid_arguments(
            procedure,
            format!("expected no arguments, got {}", args.len()),
        ))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    gateway: Arc<Gateway>,
    next_client_id: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            gateway,
            next_client_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Open a new client connection. Calls submitted on it are served until
    /// every handle to the connection is dropped.
    pub fn connect(&self) -> ClientConnection {
        let (tx, mut rx) = mpsc::unbounded_channel::<Call>();
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let dispatcher = self.clone();

        tokio::spawn(async move {
            debug!("Client {} connected", id);
            while let Some(call) = rx.recv().await {
                dispatcher.dispatch(call).await;
            }
            debug!("Client {} disconnected", id);
        });

        ClientConnection { id, tx }
    }

    /// Serve one call and deliver its reply.
    ///
    /// The procedure runs in its own task so a panic is turned into an error
    /// reply. Returns once the reply has been handed to the callback.
    pub async fn dispatch(&self, call: Call) {
        let Call {
            procedure,
            args,
            callback,
        } = call;

        let gateway = self.gateway.clone();
        let name = procedure.clone();
        let invocation = tokio::spawn(async move {
            match Procedure::parse(&procedure, &args) {
                Ok(parsed) => parsed.invoke(&gateway).await,
                Err(e) => Err(e),
            }
        });

        let reply = match invocation.await {
            Ok(reply) => reply,
            Err(e) => {
                let message = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                warn!("Call to '{}' panicked: {}", name, message);
                Err(GatewayError::Panicked {
                    procedure: name.clone(),
                    message,
                })
            }
        };

        if let Err(e) = &reply {
            debug!("Call to '{}' failed: {}", name, e);
        }
        if callback.send(reply).is_err() {
            debug!("Caller of '{}' went away before the reply", name);
        }
    }
}

/// A client's handle for submitting calls
#[derive(Clone)]
pub struct ClientConnection {
    id: u64,
    tx: mpsc::UnboundedSender<Call>,
}

impl ClientConnection {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Submit a raw call frame
    pub fn submit(&self, call: Call) -> Result<(), GatewayError> {
        self.tx.send(call).map_err(|_| GatewayError::Disconnected)
    }

    /// Submit a call and wait for its reply
    pub async fn call(&self, procedure: &str, args: Vec<Value>) -> Reply {
        let (callback, reply) = oneshot::channel();
        self.submit(Call {
            procedure: procedure.to_string(),
            args,
            callback,
        })?;
        reply.await.map_err(|_| GatewayError::NoReply)?
    }
}

/// Typed client over a `ClientConnection`
#[derive(Clone)]
pub struct GatewayClient {
    connection: ClientConnection,
}

impl GatewayClient {
    pub fn new(connection: ClientConnection) -> Self {
        Self { connection }
    }

    pub fn connection(&self) -> &ClientConnection {
        &self.connection
    }

    async fn call_json(&self, procedure: &str, args: Vec<Value>) -> Result<Value, GatewayError> {
        match self.connection.call(procedure, args).await? {
            ReplyValue::Json(value) => Ok(value),
            other => Err(unexpected(procedure, "a value", &other)),
        }
    }

    pub async fn open_telemetry_stream(&self, channel: &str) -> Result<Subscription, GatewayError> {
        let procedure = "openTelemetryStream";
        match self.connection.call(procedure, vec![channel.into()]).await? {
            ReplyValue::TelemetryStream(stream) => Ok(stream),
            other => Err(unexpected(procedure, "a telemetry stream", &other)),
        }
    }

    pub async fn last_telemetry_value(&self, channel: &str) -> Result<Option<Record>, GatewayError> {
        let value = self
            .call_json("lastTelemetryValue", vec![channel.into()])
            .await?;
        decode("lastTelemetryValue", value)
    }

    pub async fn set_root_record_directory(&self, path: &Path) -> Result<(), GatewayError> {
        let path = path.to_string_lossy().into_owned();
        self.call_json("setRootRecordDirectory", vec![path.into()])
            .await
            .map(|_| ())
    }

    pub async fn has_record_directory(&self) -> Result<bool, GatewayError> {
        let value = self.call_json("hasRecordDirectory", vec![]).await?;
        decode("hasRecordDirectory", value)
    }

    pub async fn enable_recording(&self, channel: &str) -> Result<(), GatewayError> {
        self.call_json("enableRecording", vec![channel.into()])
            .await
            .map(|_| ())
    }

    pub async fn disable_recording(&self, channel: &str) -> Result<(), GatewayError> {
        self.call_json("disableRecording", vec![channel.into()])
            .await
            .map(|_| ())
    }

    pub async fn open_recording_status_stream(&self) -> Result<StatusStream, GatewayError> {
        let procedure = "openRecordingStatusStream";
        match self.connection.call(procedure, vec![]).await? {
            ReplyValue::StatusStream(stream) => Ok(stream),
            other => Err(unexpected(procedure, "a status stream", &other)),
        }
    }

    pub async fn current_recording_status(&self) -> Result<RecordingStatus, GatewayError> {
        let value = self.call_json("currentRecordingStatus", vec![]).await?;
        decode("currentRecordingStatus", value)
    }

    pub async fn get_schema(&self) -> Result<Option<Value>, GatewayError> {
        let value = self.call_json("getSchema", vec![]).await?;
        Ok((!value.is_null()).then_some(value))
    }
}

fn unexpected(procedure: &str, expected: &'static str, actual: &ReplyValue) -> GatewayError {
    GatewayError::UnexpectedReply {
        procedure: procedure.to_string(),
        expected,
        actual: actual.kind(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(procedure: &str, value: Value) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::ProcedureFailed {
        procedure: procedure.to_string(),
        source: e.into(),
    })
}
