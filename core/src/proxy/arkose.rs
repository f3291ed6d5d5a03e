//! Arkose token provisioning
//!
//! A fresh token is requested for every conversation that targets the
//! restricted model family; tokens are single-use and never cached. The
//! strategy is chosen once at startup: a configured exchange endpoint wins,
//! otherwise the local solver runs.

use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ArkoseConfig;
use crate::proxy::error::TokenError;
use crate::proxy::upstream::client::UpstreamClient;

#[async_trait]
pub trait TokenProvisioner: Send + Sync {
    /// Obtain one token. Never retries.
    async fn provision(&self) -> Result<String, TokenError>;

    /// Strategy name for log lines
    fn strategy(&self) -> &'static str;
}

/// Synchronous token solver. Called on the blocking pool.
pub trait ArkoseSolver: Send + Sync {
    fn solve(&self) -> Result<String, TokenError>;
}

/// Pick the provisioning strategy from configuration
pub fn build_provisioner(config: &ArkoseConfig, client: UpstreamClient) -> Arc<dyn TokenProvisioner> {
    match config.url.as_deref().filter(|u| !u.is_empty()) {
        Some(url) => {
            tracing::info!("Arkose tokens from exchange endpoint {}", url);
            Arc::new(RemoteExchange::new(client, url))
        }
        None => {
            let timeout = Duration::from_secs(config.solver_timeout);
            let solver: Arc<dyn ArkoseSolver> = match CommandSolver::from_argv(&config.solver_command, timeout) {
                Some(solver) => {
                    tracing::info!("Arkose tokens from local solver {:?}", config.solver_command);
                    Arc::new(solver)
                }
                None => {
                    tracing::warn!("No arkose url or solver_command configured; gpt-4 requests will fail");
                    Arc::new(UnconfiguredSolver)
                }
            };
            Arc::new(LocalSolver::new(solver))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    #[serde(default)]
    token: String,
}

/// Fetches tokens from an external exchange service answering
/// `GET <url>` with `{"token": "..."}`
pub struct RemoteExchange {
    client: UpstreamClient,
    url: String,
}

impl RemoteExchange {
    pub fn new(client: UpstreamClient, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl TokenProvisioner for RemoteExchange {
    async fn provision(&self) -> Result<String, TokenError> {
        let response = self.client
            .fetch(&self.url)
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| TokenError::Transport(e.to_string()))?;

        let exchange: ExchangeResponse = serde_json::from_slice(&body)
            .map_err(|e| TokenError::Transport(format!("invalid exchange response: {}", e)))?;

        if exchange.token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(exchange.token)
    }

    fn strategy(&self) -> &'static str {
        "exchange"
    }
}

/// Runs a synchronous solver without blocking the async workers
pub struct LocalSolver {
    solver: Arc<dyn ArkoseSolver>,
}

impl LocalSolver {
    pub fn new(solver: Arc<dyn ArkoseSolver>) -> Self {
        Self { solver }
    }
}

#[async_trait]
impl TokenProvisioner for LocalSolver {
    async fn provision(&self) -> Result<String, TokenError> {
        let solver = self.solver.clone();
        tokio::task::spawn_blocking(move || solver.solve())
            .await
            .map_err(|e| TokenError::Solver(e.to_string()))?
    }

    fn strategy(&self) -> &'static str {
        "solver"
    }
}

/// How often a running solver program is checked for exit
const SOLVER_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Solver backed by an external program; its trimmed stdout is the token.
/// A program still running after `timeout` is killed.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSolver {
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn failure(&self, e: impl std::fmt::Display) -> TokenError {
        TokenError::Solver(format!("{}: {}", self.program, e))
    }
}

impl ArkoseSolver for CommandSolver {
    fn solve(&self) -> Result<String, TokenError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failure(e))?;

        let deadline = Instant::now() + self.timeout;
        while child.try_wait().map_err(|e| self.failure(e))?.is_none() {
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    tracing::warn!("Failed to kill solver {}: {}", self.program, e);
                }
                // Reap it so no zombie is left behind
                let _ = child.wait();
                return Err(self.failure(format!("timed out after {}s", self.timeout.as_secs_f32())));
            }
            std::thread::sleep(SOLVER_POLL_INTERVAL);
        }

        let output = child.wait_with_output().map_err(|e| self.failure(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TokenError::Solver(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(token)
    }
}

/// Placeholder used when neither an exchange url nor a solver is configured
pub struct UnconfiguredSolver;

impl ArkoseSolver for UnconfiguredSolver {
    fn solve(&self) -> Result<String, TokenError> {
        Err(TokenError::Solver("no arkose solver configured".to_string()))
    }
}
