//! Code-interpreter upload helpers
//! Handles POST /files and POST /process_upload

use axum::{
    extract::State,
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use super::new_trace_id;
use crate::proxy::classifier::{rewrite_url, RelayMode, Route};
use crate::proxy::error::ProxyError;
use crate::proxy::models::{CreateFileRequest, CreateFileResponse, ProcessUploadRequest};
use crate::proxy::relay::{relay_buffered, relay_json};
use crate::proxy::server::AppState;
use crate::proxy::upstream::request::{extract_credential, OutboundRequest};

const FILES_PATH: &str = "/files";
const PROCESS_UPLOAD_PATH: &str = "/conversation/interpreter/process_upload";

/// Handle POST /files
pub async fn handle_create_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = new_trace_id();

    let result = async {
        let request: CreateFileRequest = parse_body(&body, CreateFileRequest::validate)?;
        info!("[{}] Create file | Name: {} | Size: {}", trace_id, request.file_name, request.file_size);

        let response = post_json(&state, &headers, FILES_PATH, &request).await?;
        relay_json::<CreateFileResponse>(response).await
    }
    .await;

    finish(result, &trace_id, FILES_PATH)
}

/// Handle POST /process_upload
pub async fn handle_process_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let trace_id = new_trace_id();

    let result = async {
        let request: ProcessUploadRequest = parse_body(&body, ProcessUploadRequest::validate)?;
        info!("[{}] Process upload | File: {}", trace_id, request.file_id);

        let response = post_json(&state, &headers, PROCESS_UPLOAD_PATH, &request).await?;
        relay_buffered(response).await
    }
    .await;

    finish(result, &trace_id, PROCESS_UPLOAD_PATH)
}

fn parse_body<T, V>(body: &[u8], validate: V) -> Result<T, ProxyError>
where
    T: DeserializeOwned,
    V: Fn(&T) -> Result<(), String>,
{
    let request: T = serde_json::from_slice(body).map_err(|e| ProxyError::InvalidPayload(e.to_string()))?;
    validate(&request).map_err(ProxyError::InvalidPayload)?;
    Ok(request)
}

async fn post_json<T: Serialize>(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    payload: &T,
) -> Result<reqwest::Response, ProxyError> {
    let route = Route {
        target: rewrite_url(&state.config.base_url, path, None),
        mode: RelayMode::Buffered,
    };
    let body = serde_json::to_vec(payload).map_err(|e| ProxyError::Relay(e.to_string()))?;

    let outbound = OutboundRequest::build(
        Method::POST,
        &route,
        extract_credential(headers),
        &state.config.user_agent,
        Bytes::from(body),
    );

    Ok(state.upstream.execute(outbound).await?)
}

fn finish(result: Result<Response, ProxyError>, trace_id: &str, path: &str) -> Response {
    result.unwrap_or_else(|e| {
        error!("[{}] POST {} failed ({}): {}", trace_id, path, e.status(), e);
        e.into_response()
    })
}
