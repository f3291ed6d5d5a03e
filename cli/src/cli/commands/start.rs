use gptproxy_core::config::Config;
use gptproxy_core::proxy::{AppState, ProxyServer};

pub async fn run(mut config: Config, host_override: Option<String>, port_override: Option<u16>) -> anyhow::Result<()> {
    // Apply overrides if provided
    if let Some(host) = host_override {
        config.server.host = host;
    }
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Starting gptproxy...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", config.server.host);
    tracing::info!("  Upstream: {}", config.upstream.base_url);
    match &config.arkose.url {
        Some(url) => tracing::info!("  Arkose exchange: {}", url),
        None => tracing::info!("  Arkose solver: {:?}", config.arkose.solver_command),
    }
    if let Some(report_url) = &config.report.url {
        tracing::info!("  Report URL: {} (not used)", report_url);
    }

    let state = AppState::from_config(&config)?;
    let server = ProxyServer::new(config.server.host.clone(), config.server.port, state);

    tracing::info!("Proxy server starting on http://{}:{}", config.server.host, config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    Ok(())
}
