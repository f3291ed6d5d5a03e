use std::path::PathBuf;

use gptproxy_core::config::Config;

pub async fn run(config: Config, source: Option<PathBuf>) -> anyhow::Result<()> {
    println!("gptproxy Status");
    println!("===============");
    println!();
    println!("Configuration:");
    match source {
        Some(path) => println!("  Config file: {:?}", path),
        None => println!("  Config file: none (built-in defaults)"),
    }
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!();
    println!("Upstream:");
    println!("  Base URL: {}", config.upstream.base_url);
    println!("  HTTP proxy: {}", config.upstream.http_proxy.as_deref().unwrap_or("-"));
    println!("  Cookies: {}", config.upstream.cookies.len());
    println!("  Timeout: {}s", config.timeouts.request_timeout);
    println!();
    println!("Arkose:");
    match &config.arkose.url {
        Some(url) => println!("  Strategy: exchange ({})", url),
        None if config.arkose.solver_command.is_empty() => println!("  Strategy: solver (not configured)"),
        None => {
            println!("  Strategy: solver ({})", config.arkose.solver_command.join(" "));
            println!("  Solver timeout: {}s", config.arkose.solver_timeout);
        }
    }

    // Check if server is reachable
    println!();
    let url = format!("http://{}:{}/status", config.server.host, config.server.port);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("Server: RUNNING ✓");
        }
        _ => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
