use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Start at info so config loading is visible, then switch to the configured level
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(log_filter("info")?)
        .with_filter_reloading();
    let log_reload = subscriber.reload_handle();
    subscriber.init();

    let loaded = gptproxy_core::config::load_config(cli.config)?;
    log_reload.reload(log_filter(&loaded.config.logging.level)?)?;

    match cli.command {
        Commands::Start { host, port } => {
            cli::commands::start::run(loaded.config, host, port).await?;
        }
        Commands::Status => {
            cli::commands::status::run(loaded.config, loaded.source).await?;
        }
        Commands::Token => {
            cli::commands::token::run(loaded.config).await?;
        }
    }

    Ok(())
}

fn log_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(format!("gptproxy={}", level).parse()?)
        .add_directive(format!("gptproxy_core={}", level).parse()?)
        .add_directive("tower_http=debug".parse()?))
}
