//! WebSocket client for a running `spicerun serve`.
//!
//! [`RemoteClient`] implements [`JobClient`] over the server protocol, so
//! code written against the in-process handle works unchanged against a
//! remote scheduler. Job errors reported by the server are rebuilt from the
//! structured `detail` of the response.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use spicerun_scheduler::{CancelAck, ClientError, ClientResult, JobClient, SubmitRequest};
use spicerun_spec::{JobId, JobSnapshot, SimulationResult};

use crate::commands::backends::BackendStatus;
use crate::commands::serve::{ServeRequest, ServeResponse};

/// URL of a server started with default options.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:9124";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connection to a job server. Requests on one client are serialized.
pub struct RemoteClient {
    socket: Mutex<Socket>,
}

#[derive(Deserialize)]
struct Submitted {
    job_id: JobId,
}

impl RemoteClient {
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(format!("cannot connect to {}: {}", url, e)))?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Snapshots of every job on the server.
    pub async fn list(&self) -> ClientResult<Vec<JobSnapshot>> {
        self.call_as(&ServeRequest::List).await
    }

    /// Backends configured on the server.
    pub async fn backends(&self) -> ClientResult<Vec<BackendStatus>> {
        self.call_as(&ServeRequest::Backends).await
    }

    /// Polls the job's status until it is terminal.
    pub async fn wait_for_terminal(&self, id: JobId, poll: Duration) -> ClientResult<JobSnapshot> {
        loop {
            let snapshot = self.status(id).await?;
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Closes the connection.
    pub async fn close(self) -> ClientResult<()> {
        self.socket
            .into_inner()
            .close(None)
            .await
            .map_err(ClientError::transport)
    }

    async fn call_as<T: DeserializeOwned>(&self, request: &ServeRequest) -> ClientResult<T> {
        let value = self.call(request).await?;
        serde_json::from_value(value).map_err(ClientError::transport)
    }

    async fn call(&self, request: &ServeRequest) -> ClientResult<Value> {
        let text = serde_json::to_string(request).map_err(ClientError::transport)?;
        let mut socket = self.socket.lock().await;
        socket
            .send(Message::Text(text))
            .await
            .map_err(ClientError::transport)?;

        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return decode_response(&text),
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8(data).map_err(ClientError::transport)?;
                    return decode_response(&text);
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ClientError::Transport(
                        "connection closed by server".to_string(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ClientError::transport(e)),
            }
        }
    }
}

/// Turns a response into its result value or the error it carries.
pub fn decode_response(text: &str) -> ClientResult<Value> {
    let response: ServeResponse = serde_json::from_str(text).map_err(ClientError::transport)?;
    if response.success {
        return Ok(response.result.unwrap_or(Value::Null));
    }
    match response.errors.into_iter().next() {
        Some(error) => Err(error.detail.unwrap_or_else(|| {
            ClientError::Transport(format!("{}: {}", error.code, error.message))
        })),
        None => Err(ClientError::Transport(
            "server reported a failure without an error".to_string(),
        )),
    }
}

#[async_trait]
impl JobClient for RemoteClient {
    async fn submit(&self, request: SubmitRequest) -> ClientResult<JobId> {
        let submitted: Submitted = self
            .call_as(&ServeRequest::Submit {
                schematic: request.schematic,
                overrides: request.overrides,
                backend: request.backend,
                switches: request.switches,
            })
            .await?;
        Ok(submitted.job_id)
    }

    async fn status(&self, id: JobId) -> ClientResult<JobSnapshot> {
        self.call_as(&ServeRequest::Status { job_id: id }).await
    }

    async fn fetch(&self, id: JobId) -> ClientResult<SimulationResult> {
        self.call_as(&ServeRequest::Fetch { job_id: id }).await
    }

    async fn cancel(&self, id: JobId) -> ClientResult<CancelAck> {
        self.call_as(&ServeRequest::Cancel { job_id: id }).await
    }
}
