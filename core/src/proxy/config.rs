//! Immutable settings injected into the request pipeline

use axum::http::HeaderValue;

use crate::config::Config;

/// Upstream settings shared read-only by every request task
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Scheme and host of the upstream, without a trailing slash
    pub base_url: String,
    pub user_agent: HeaderValue,
}

impl ProxyConfig {
    pub fn new(base_url: impl Into<String>, user_agent: &str) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let user_agent = HeaderValue::from_str(user_agent)
            .map_err(|_| anyhow::anyhow!("Invalid user agent header value"))?;
        Ok(Self { base_url, user_agent })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(config.upstream.base_url.clone(), &config.upstream.user_agent)
    }
}
