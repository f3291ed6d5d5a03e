use gptproxy_core::config::Config;
use gptproxy_core::proxy::AppState;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let strategy = state.provisioner.strategy();

    match state.provisioner.provision().await {
        Ok(token) => {
            println!("Strategy: {}", strategy);
            println!("{}", token);
            Ok(())
        }
        Err(e) => {
            anyhow::bail!("Arkose token via {} failed [{}]: {}", strategy, e.kind(), e)
        }
    }
}
