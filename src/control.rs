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


use anyhow::{Context, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Call, ClientConnection, Dispatcher, Reply, ReplyValue};
use crate::error::GatewayError;

/// Request line sent by a control client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlRequest {
    pub id: u64,
    pub procedure: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// Response line sent back to a control client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub id: u64,
    #[serde(flatten)]
    pub body: ControlBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlBody {
    Value(Value),
    Error(String),
    /// The reply is a stream; `Item`s with the same id follow
    Stream(bool),
    Item(Value),
}

const CANCEL_PROCEDURE: &str = "cancel";

/// Longest request line accepted on a control connection
const MAX_REQUEST_LENGTH: usize = 1024 * 1024;

/// A request whose reply has not finished, keyed by request id
struct ActiveCall {
    serial: u64,
    cancel: CancellationToken,
}

type ActiveCalls = Arc<DashMap<u64, ActiveCall>>;

/// Control interface exposing the dispatcher over line-delimited JSON on TCP.
///
/// Every accepted connection is an independent dispatcher client. Requests
/// on a connection are submitted in the order they are read. A request id
/// stays in use until its reply (or stream) ends, and `cancel` with that id
/// stops it.
pub struct ControlInterface {
    listener: TcpListener,
    dispatcher: Dispatcher,
}

impl ControlInterface {
    pub async fn bind(address: &str, dispatcher: Dispatcher) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind control socket on {}", address))?;
        Ok(Self {
            listener,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the control interface (blocks until stopped)
    pub async fn run(self) -> Result<()> {
        info!("Control interface listening on {}", self.local_addr()?);
        loop {
            let (socket, peer) = self.listener.accept().await?;
            let connection = self.dispatcher.connect();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(socket, connection).await {
                    error!("Error handling control connection {}: {:#}", peer, e);
                }
                debug!("Control connection {} closed", peer);
            });
        }
    }

    async fn handle_connection(socket: TcpStream, connection: ClientConnection) -> Result<()> {
        let (reader, mut writer) = socket.into_split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ControlResponse>();

        let writer_task = tokio::spawn(async move {
            while let Some(response) = out_rx.recv().await {
                let mut line = serde_json::to_vec(&response)?;
                line.push(b'\n');
                writer.write_all(&line).await?;
            }
            anyhow::Ok(())
        });

        let closed = CancellationToken::new();
        let active: ActiveCalls = Arc::new(DashMap::new());
        let mut next_serial = 0u64;
        let mut lines =
            FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_REQUEST_LENGTH));

        loop {
            let line = match lines.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!("Closing control connection after read error: {}", e);
                    break;
                }
                None => break,
            };
            if line.trim().is_empty() {
                continue;
            }

            let respond = |id, body| {
                let _ = out_tx.send(ControlResponse { id, body });
            };

            let request: ControlRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    warn!("Malformed control request: {}", e);
                    respond(0, ControlBody::Error(format!("malformed request: {}", e)));
                    continue;
                }
            };
            let id = request.id;

            if request.procedure == CANCEL_PROCEDURE {
                let body = match request.args.first().and_then(Value::as_u64) {
                    Some(target) => {
                        if let Some((_, call)) = active.remove(&target) {
                            call.cancel.cancel();
                        }
                        ControlBody::Value(Value::Null)
                    }
                    None => ControlBody::Error("cancel expects a stream id".to_string()),
                };
                respond(id, body);
                continue;
            }

            let serial = next_serial;
            next_serial += 1;
            let cancel = closed.child_token();
            match active.entry(id) {
                Entry::Occupied(_) => {
                    let message = format!("request id {} is already in use", id);
                    respond(id, ControlBody::Error(message));
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(ActiveCall {
                        serial,
                        cancel: cancel.clone(),
                    });
                }
            }

            let (callback, reply) = oneshot::channel();
            let call = Call {
                procedure: request.procedure,
                args: request.args,
                callback,
            };
            if let Err(e) = connection.submit(call) {
                active.remove(&id);
                respond(id, ControlBody::Error(e.to_string()));
                continue;
            }

            tokio::spawn(Self::serve_call(
                id,
                serial,
                reply,
                out_tx.clone(),
                cancel,
                active.clone(),
            ));
        }

        closed.cancel();
        drop(out_tx);
        // stream pumps hold senders until they observe the cancellation
        writer_task.await??;
        Ok(())
    }

    async fn serve_call(
        id: u64,
        serial: u64,
        reply: oneshot::Receiver<Reply>,
        out: mpsc::UnboundedSender<ControlResponse>,
        cancel: CancellationToken,
        active: ActiveCalls,
    ) {
        let reply = reply.await.unwrap_or(Err(GatewayError::NoReply));
        let respond = |body| out.send(ControlResponse { id, body }).is_ok();

        match reply {
            Ok(ReplyValue::Json(value)) => {
                respond(ControlBody::Value(value));
            }
            Err(e) => {
                respond(ControlBody::Error(e.to_string()));
            }
            Ok(ReplyValue::TelemetryStream(mut stream)) => {
                respond(ControlBody::Stream(true));
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        next = stream.recv() => match next {
                            Some(record) => {
                                let item = serde_json::to_value(&*record).unwrap_or(Value::Null);
                                if !respond(ControlBody::Item(item)) {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }
            Ok(ReplyValue::StatusStream(mut stream)) => {
                respond(ControlBody::Stream(true));
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        next = stream.recv() => match next {
                            Some(status) => {
                                let item = serde_json::to_value(&status).unwrap_or(Value::Null);
                                if !respond(ControlBody::Item(item)) {
                                    break;
                                }
                            }
                            None => break,
                        },
                    }
                }
            }
        }

        active.remove_if(&id, |_, call| call.serial == serial);
    }
}
