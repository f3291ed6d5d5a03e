//! Outbound request construction. Pure, no I/O.

use axum::http::{header, HeaderMap, HeaderValue, Method};

use crate::proxy::classifier::{RelayMode, Route, UpstreamTarget};

/// Secondary credential header, preferred over `Authorization`
pub const X_AUTHORIZATION: &str = "x-authorization";

/// The request the proxy sends upstream. The body is either an encoded
/// payload or the inbound body still being received.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub target: UpstreamTarget,
    pub headers: HeaderMap,
    pub body: reqwest::Body,
}

impl OutboundRequest {
    /// Assemble the forwarded request. The credential is forwarded as-is,
    /// even when empty. `Accept: application/json` is only sent on buffered
    /// routes.
    pub fn build(
        method: Method,
        route: &Route,
        credential: HeaderValue,
        user_agent: &HeaderValue,
        body: impl Into<reqwest::Body>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, user_agent.clone());
        headers.insert(header::AUTHORIZATION, credential);

        match route.mode {
            RelayMode::Buffered => {
                headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
            }
            RelayMode::Streaming => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
        }

        Self {
            method,
            target: route.target.clone(),
            headers,
            body: body.into(),
        }
    }
}

/// Pick the caller's credential: `X-Authorization` if present, else
/// `Authorization`, else an empty value.
pub fn extract_credential(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(X_AUTHORIZATION)
        .filter(|v| !v.is_empty())
        .or_else(|| headers.get(header::AUTHORIZATION))
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::proxy::classifier::classify;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn prefers_x_authorization() {
        let map = headers(&[("authorization", "Bearer plain"), ("x-authorization", "Bearer secondary")]);
        assert_eq!(extract_credential(&map), "Bearer secondary");
    }

    #[test]
    fn falls_back_to_authorization() {
        let map = headers(&[("authorization", "Bearer plain")]);
        assert_eq!(extract_credential(&map), "Bearer plain");

        let map = headers(&[("authorization", "Bearer plain"), ("x-authorization", "")]);
        assert_eq!(extract_credential(&map), "Bearer plain");
    }

    #[test]
    fn missing_credential_is_empty() {
        assert_eq!(extract_credential(&HeaderMap::new()), "");
    }

    #[test]
    fn buffered_request_accepts_json() {
        let route = classify("https://chat.openai.com", "/models", None);
        let ua = HeaderValue::from_static("test-agent");
        let request = OutboundRequest::build(
            Method::GET,
            &route,
            HeaderValue::from_static("Bearer t"),
            &ua,
            Bytes::new(),
        );

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.target.as_str(), "https://chat.openai.com/backend-api/models");
        assert_eq!(request.headers[header::USER_AGENT], "test-agent");
        assert_eq!(request.headers[header::AUTHORIZATION], "Bearer t");
        assert_eq!(request.headers[header::ACCEPT], "application/json");
    }

    #[test]
    fn streaming_request_omits_accept() {
        let route = classify("https://chat.openai.com", "/conversation", None);
        let ua = HeaderValue::from_static("test-agent");
        let request = OutboundRequest::build(
            Method::POST,
            &route,
            HeaderValue::from_static(""),
            &ua,
            Bytes::from_static(b"{}"),
        );

        assert!(request.headers.get(header::ACCEPT).is_none());
        assert_eq!(request.headers[header::AUTHORIZATION], "");
        assert_eq!(request.body.as_bytes(), Some(&b"{}"[..]));
    }
}
