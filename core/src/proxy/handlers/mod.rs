// Handler modules
pub mod chatgpt;
pub mod files;

use axum::body::Body;
use bytes::Bytes;

use crate::proxy::error::ProxyError;
use crate::proxy::server::MAX_BODY_BYTES;

/// Short random id prefixed to every log line of one request
pub(crate) fn new_trace_id() -> String {
    use rand::Rng;
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

pub(crate) async fn read_body(body: Body) -> Result<Bytes, ProxyError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::InvalidPayload(format!("Failed to read body: {}", e)))
}
