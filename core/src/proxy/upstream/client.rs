//! Upstream client shared by every request task

use std::sync::Arc;

use reqwest::{cookie::Jar, redirect, Client, Response, Url};
use tokio::time::Duration;

use crate::config::{TimeoutsConfig, UpstreamConfig};
use crate::proxy::upstream::request::OutboundRequest;

/// Pooled HTTP transport with a cookie jar and an optional outbound proxy.
/// Cloning shares the pool and the jar.
#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    cookie_jar: Arc<Jar>,
}

impl UpstreamClient {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutsConfig) -> anyhow::Result<Self> {
        let cookie_jar = Arc::new(Jar::default());

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_timeout))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(timeouts.request_timeout))
            .redirect(redirect::Policy::none())
            .cookie_provider(cookie_jar.clone())
            // Only the configured proxy applies, never one picked up from the environment
            .no_proxy();

        if let Some(proxy) = upstream.http_proxy.as_deref().filter(|p| !p.is_empty()) {
            let p = reqwest::Proxy::all(proxy)
                .map_err(|e| anyhow::anyhow!("Invalid http_proxy {:?}: {}", proxy, e))?;
            builder = builder.proxy(p);
            tracing::info!("Using upstream proxy: {}", proxy);
        }

        let http_client = builder.build()?;
        let client = Self { http_client, cookie_jar };

        if !upstream.cookies.is_empty() {
            let url = Url::parse(&upstream.base_url)?;
            client.set_cookies(&url, &upstream.cookies);
            tracing::info!("Seeded {} cookie(s) for {}", upstream.cookies.len(), url);
        }

        Ok(client)
    }

    /// Store `name=value` cookies for `url`; later calls to that host send them.
    pub fn set_cookies(&self, url: &Url, cookies: &[String]) {
        for cookie in cookies {
            self.cookie_jar.add_cookie_str(cookie, url);
        }
    }

    /// Send a built outbound request
    pub async fn execute(&self, request: OutboundRequest) -> Result<Response, reqwest::Error> {
        let OutboundRequest { method, target, headers, body } = request;

        self.http_client
            .request(method, target.as_str())
            .headers(headers)
            .body(body)
            .send()
            .await
    }

    /// Plain GET, used for the arkose token exchange
    pub async fn fetch(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.http_client.get(url).send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;

    #[test]
    fn seeds_configured_cookies() {
        let upstream = UpstreamConfig {
            cookies: vec!["_puid=user-123".to_string(), "cf_clearance=xyz".to_string()],
            ..Default::default()
        };
        let client = UpstreamClient::new(&upstream, &TimeoutsConfig::default()).unwrap();

        let url = Url::parse("https://chat.openai.com/backend-api/models").unwrap();
        let header = client.cookie_jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains("_puid=user-123"));
        assert!(header.contains("cf_clearance=xyz"));
    }

    #[test]
    fn rejects_invalid_proxy() {
        let upstream = UpstreamConfig {
            http_proxy: Some("::not a proxy::".to_string()),
            ..Default::default()
        };
        assert!(UpstreamClient::new(&upstream, &TimeoutsConfig::default()).is_err());
    }
}
