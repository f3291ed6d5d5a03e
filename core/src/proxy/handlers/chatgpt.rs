//! ChatGPT backend handler
//! Handles ANY /api/*path

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{error, info};

use super::{new_trace_id, read_body};
use crate::proxy::classifier::{classify, Route};
use crate::proxy::error::ProxyError;
use crate::proxy::models::ChatRequest;
use crate::proxy::relay::{relay_buffered, relay_stream};
use crate::proxy::server::AppState;
use crate::proxy::upstream::request::{extract_credential, OutboundRequest};

/// Mount point stripped before classification
const API_PREFIX: &str = "/api";

/// Handle ANY /api/*path
pub async fn handle_api(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let trace_id = new_trace_id();

    let path = uri.path().strip_prefix(API_PREFIX).unwrap_or(uri.path());
    let route = classify(&state.config.base_url, path, uri.query());
    let credential = extract_credential(&headers);

    let result = if route.is_conversation() {
        forward_conversation(&state, method.clone(), &route, credential, body, &trace_id).await
    } else {
        forward_opaque(&state, method.clone(), &route, credential, body, &trace_id).await
    };

    result.unwrap_or_else(|e| {
        error!("[{}] {} {} failed ({}): {}", trace_id, method, path, e.status(), e);
        e.into_response()
    })
}

/// Conversational turns: interpret the payload, inject an arkose token when
/// the model needs one, and stream the answer back.
async fn forward_conversation(
    state: &AppState,
    method: Method,
    route: &Route,
    credential: HeaderValue,
    body: Body,
    trace_id: &str,
) -> Result<Response, ProxyError> {
    let bytes = read_body(body).await?;
    let mut request: ChatRequest =
        serde_json::from_slice(&bytes).map_err(|e| ProxyError::InvalidPayload(e.to_string()))?;

    request.normalize_messages();
    request.arkose_token = None;

    if request.requires_arkose() {
        let token = state.provisioner.provision().await.map_err(|e| {
            error!(
                "[{}] Arkose token ({}) failed [{}]: {}",
                trace_id,
                state.provisioner.strategy(),
                e.kind(),
                e
            );
            e
        })?;
        request.arkose_token = Some(token);
    }

    info!(
        "[{}] Conversation | Model: {} | Messages: {} | Arkose: {}",
        trace_id,
        request.model,
        request.messages.len(),
        request.arkose_token.is_some()
    );

    let payload = serde_json::to_vec(&request).map_err(|e| ProxyError::Relay(e.to_string()))?;
    let outbound = OutboundRequest::build(
        method,
        route,
        credential,
        &state.config.user_agent,
        Bytes::from(payload),
    );

    let response = state.upstream.execute(outbound).await?;
    relay_stream(response, trace_id.to_string()).await
}

/// Everything else: stream the body through untouched and re-encode the JSON answer
async fn forward_opaque(
    state: &AppState,
    method: Method,
    route: &Route,
    credential: HeaderValue,
    body: Body,
    trace_id: &str,
) -> Result<Response, ProxyError> {
    tracing::debug!("[{}] {} {}", trace_id, method, route.target);

    let outbound = OutboundRequest::build(method, route, credential, &state.config.user_agent, outbound_body(body));
    let response = state.upstream.execute(outbound).await?;
    relay_buffered(response).await
}

/// Pipe the inbound body upstream as it arrives. Bodiless requests stay bodiless
/// instead of going out chunked.
fn outbound_body(body: Body) -> reqwest::Body {
    if body.size_hint().exact() == Some(0) {
        return reqwest::Body::from(Bytes::new());
    }
    reqwest::Body::wrap_stream(body.into_data_stream())
}
