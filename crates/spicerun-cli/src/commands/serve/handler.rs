//! Request handler logic for the WebSocket job server.

use serde::Serialize;
use tokio_tungstenite::tungstenite::Message;

use spicerun_scheduler::{ClientResult, JobClient, SchedulerHandle, SubmitRequest};

use super::types::{error_codes, ServeRequest, ServeResponse, WireError};
use crate::commands::backends;

/// Process a single WebSocket message and return a response.
pub async fn process_message(handle: &SchedulerHandle, msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(handle_request(handle, &text).await),
        Message::Binary(data) => match String::from_utf8(data) {
            Ok(text) => Some(handle_request(handle, &text).await),
            Err(_) => Some(encode(&ServeResponse::error(WireError::new(
                error_codes::INVALID_UTF8,
                "Binary message must be valid UTF-8 JSON",
            )))),
        },
        // Control frames are answered by tungstenite.
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

/// Handle a JSON request and return a JSON response.
pub async fn handle_request(handle: &SchedulerHandle, json_text: &str) -> String {
    let request: ServeRequest = match serde_json::from_str(json_text) {
        Ok(req) => req,
        Err(e) => {
            return encode(&ServeResponse::error(WireError::new(
                error_codes::INVALID_REQUEST,
                format!("Invalid request JSON: {}", e),
            )))
        }
    };
    encode(&dispatch(handle, request).await)
}

/// Runs one request against the scheduler.
pub async fn dispatch(handle: &SchedulerHandle, request: ServeRequest) -> ServeResponse {
    match request {
        ServeRequest::Submit {
            schematic,
            overrides,
            backend,
            switches,
        } => {
            let request = SubmitRequest {
                schematic,
                overrides,
                backend,
                switches,
            };
            respond(
                handle
                    .submit(request)
                    .await
                    .map(|id| serde_json::json!({ "job_id": id })),
            )
        }
        ServeRequest::Status { job_id } => respond(handle.status(job_id).await),
        ServeRequest::Fetch { job_id } => respond(handle.fetch(job_id).await),
        ServeRequest::Cancel { job_id } => respond(handle.cancel(job_id).await),
        ServeRequest::List => respond(Ok(handle.list())),
        ServeRequest::Backends => respond(Ok(backends::collect(handle.registry(), |_| None))),
    }
}

fn respond<T: Serialize>(outcome: ClientResult<T>) -> ServeResponse {
    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => ServeResponse::ok(value),
            Err(e) => ServeResponse::error(WireError::new(
                error_codes::SERIALIZE,
                format!("Failed to serialize response: {}", e),
            )),
        },
        Err(e) => ServeResponse::error(e),
    }
}

fn encode(response: &ServeResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| {
        r#"{"success":false,"errors":[{"code":"SERVE_003","message":"Failed to serialize response"}]}"#
            .to_string()
    })
}

