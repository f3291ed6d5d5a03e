//! Maps an inbound `/api/*` path onto its upstream URL and relay mode.
//!
//! Classification is a pure string operation performed before any body is read.

/// Path that carries conversational turns and is answered as an event stream
pub const CONVERSATION_PATH: &str = "/conversation";

/// Paths under this prefix live in the upstream's public API namespace
const PUBLIC_API_PREFIX: &str = "/conversion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Decode the whole body as JSON and re-encode it
    Buffered,
    /// Forward the body line by line as an event stream
    Streaming,
}

/// Fully-qualified URL an outbound request is sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget(String);

impl UpstreamTarget {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: UpstreamTarget,
    pub mode: RelayMode,
}

impl Route {
    pub fn is_conversation(&self) -> bool {
        self.mode == RelayMode::Streaming
    }
}

/// Classify an inbound path (with the `/api` mount prefix already removed)
/// and its raw query string.
pub fn classify(base_url: &str, path: &str, query: Option<&str>) -> Route {
    let mode = if is_conversation(path) {
        RelayMode::Streaming
    } else {
        RelayMode::Buffered
    };

    Route {
        target: rewrite_url(base_url, path, query),
        mode,
    }
}

pub fn is_conversation(path: &str) -> bool {
    path == CONVERSATION_PATH
}

/// Public-API paths always carry the `?` separator, even with no query.
/// Backend-API paths only get one when the query is non-empty.
pub fn rewrite_url(base_url: &str, path: &str, query: Option<&str>) -> UpstreamTarget {
    if path.starts_with(PUBLIC_API_PREFIX) {
        return UpstreamTarget(format!(
            "{}/public-api{}?{}",
            base_url,
            path,
            query.unwrap_or("")
        ));
    }

    match query {
        Some(qs) if !qs.is_empty() => UpstreamTarget(format!("{}/backend-api{}?{}", base_url, path, qs)),
        _ => UpstreamTarget(format!("{}/backend-api{}", base_url, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://chat.openai.com";

    #[test]
    fn backend_path_without_query_has_no_separator() {
        let route = classify(BASE, "/models", None);
        assert_eq!(route.target.as_str(), "https://chat.openai.com/backend-api/models");
        assert_eq!(route.mode, RelayMode::Buffered);

        let route = classify(BASE, "/models", Some(""));
        assert_eq!(route.target.as_str(), "https://chat.openai.com/backend-api/models");
    }

    #[test]
    fn backend_path_keeps_raw_query() {
        let route = classify(BASE, "/conversations", Some("offset=0&limit=28&order=updated"));
        assert_eq!(
            route.target.as_str(),
            "https://chat.openai.com/backend-api/conversations?offset=0&limit=28&order=updated"
        );
    }

    #[test]
    fn public_api_path_always_appends_separator() {
        let route = classify(BASE, "/conversion/abc", None);
        assert_eq!(route.target.as_str(), "https://chat.openai.com/public-api/conversion/abc?");

        let route = classify(BASE, "/conversion/abc", Some("a=%20b"));
        assert_eq!(route.target.as_str(), "https://chat.openai.com/public-api/conversion/abc?a=%20b");
        assert_eq!(route.mode, RelayMode::Buffered);
    }

    #[test]
    fn only_exact_conversation_path_streams() {
        assert!(classify(BASE, "/conversation", None).is_conversation());
        assert!(!classify(BASE, "/conversations", None).is_conversation());
        assert!(!classify(BASE, "/conversation/gen_title/1", None).is_conversation());
        assert!(!classify(BASE, "/Conversation", None).is_conversation());
    }

    #[test]
    fn classification_is_pure() {
        let first = classify(BASE, "/conversation", Some("x=1"));
        let second = classify(BASE, "/conversation", Some("x=1"));
        assert_eq!(first, second);
        assert_eq!(first.target.as_str(), second.target.as_str());
    }
}
