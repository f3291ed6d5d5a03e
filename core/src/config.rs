use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fixed desktop-browser user agent sent on every upstream call
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

/// Proxy server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub arkose: ArkoseConfig,

    #[serde(default)]
    pub report: ReportConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Outbound proxy every upstream call is routed through
    #[serde(default)]
    pub http_proxy: Option<String>,

    /// `name=value` cookies seeded into the jar for `base_url` at startup
    #[serde(default)]
    pub cookies: Vec<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            http_proxy: None,
            cookies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArkoseConfig {
    /// Token-exchange endpoint. When set, tokens are fetched from it instead
    /// of running the local solver.
    #[serde(default)]
    pub url: Option<String>,

    /// Program and arguments of the local solver
    #[serde(default)]
    pub solver_command: Vec<String>,

    /// Seconds the solver program may run before it is killed
    #[serde(default = "default_solver_timeout")]
    pub solver_timeout: u64,
}

impl Default for ArkoseConfig {
    fn default() -> Self {
        Self {
            url: None,
            solver_command: Vec::new(),
            solver_timeout: default_solver_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportConfig {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_port() -> u16 { 8080 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_base_url() -> String { "https://chat.openai.com".to_string() }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_request_timeout() -> u64 { 360 }
fn default_connect_timeout() -> u64 { 20 }
fn default_solver_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    /// Apply `HTTP_PROXY`, `ARKOSE_URL` and `REPORT_URL` from the environment.
    /// A variable that is set but empty clears the setting.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("HTTP_PROXY") {
            self.upstream.http_proxy = non_empty(value);
        }
        if let Some(value) = lookup("ARKOSE_URL") {
            self.arkose.url = non_empty(value);
        }
        if let Some(value) = lookup("REPORT_URL") {
            self.report.url = non_empty(value);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        reqwest::Url::parse(&self.upstream.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid upstream.base_url {:?}: {}", self.upstream.base_url, e))?;

        axum::http::HeaderValue::from_str(&self.upstream.user_agent)
            .map_err(|_| anyhow::anyhow!("upstream.user_agent is not a valid header value"))?;

        if let Some(url) = &self.arkose.url {
            reqwest::Url::parse(url)
                .map_err(|e| anyhow::anyhow!("Invalid arkose.url {:?}: {}", url, e))?;
        }

        if let Some(program) = self.arkose.solver_command.first() {
            if program.trim().is_empty() {
                anyhow::bail!("arkose.solver_command has an empty program name");
            }
        }

        if self.arkose.solver_timeout == 0 {
            anyhow::bail!("arkose.solver_timeout must be at least 1 second");
        }

        Ok(())
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Get default config file path
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("gptproxy")
        .join("config.toml")
}

/// Configuration plus the file it was read from (`None` when built-in
/// defaults were used)
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: Option<PathBuf>,
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/gptproxy/config.toml)
///
/// A file that exists but cannot be read or parsed is an error; loading never
/// falls through to the next candidate. Environment overrides are applied on
/// top of whichever source won.
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<LoadedConfig> {
    let (mut config, source) = read_config_file(path, Path::new("config.toml"), &default_config_path())?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(LoadedConfig { config, source })
}

fn read_config_file(
    explicit: Option<PathBuf>,
    local: &Path,
    default: &Path,
) -> anyhow::Result<(Config, Option<PathBuf>)> {
    if let Some(config_path) = explicit {
        if !config_path.exists() {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
        let config = parse_config_file(&config_path)?;
        tracing::info!("Loaded config from specified path {:?}", config_path);
        return Ok((config, Some(config_path)));
    }

    for candidate in [local, default] {
        if candidate.exists() {
            let config = parse_config_file(candidate)?;
            tracing::info!("Loaded config from {:?}", candidate);
            return Ok((config, Some(candidate.to_path_buf())));
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok((Config::default(), None))
}

fn parse_config_file(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {:?}: {}", path, e))?;
    toml::from_str(&content).map_err(|e| anyhow::anyhow!("Failed to parse {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.base_url, "https://chat.openai.com");
        assert_eq!(config.upstream.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeouts.request_timeout, 360);
        assert!(config.arkose.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [upstream]
            http_proxy = "http://127.0.0.1:7890"
            cookies = ["_puid=abc"]

            [arkose]
            solver_command = ["arkose-solver", "--once"]
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream.http_proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.upstream.cookies, vec!["_puid=abc".to_string()]);
        assert_eq!(config.upstream.base_url, "https://chat.openai.com");
        assert_eq!(config.arkose.solver_command.len(), 2);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn env_overrides_replace_and_clear() {
        let mut config = Config::default();
        config.report.url = Some("http://report.local".to_string());

        let env: HashMap<&str, &str> = [
            ("ARKOSE_URL", "http://arkose.local/token"),
            ("REPORT_URL", ""),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.arkose.url.as_deref(), Some("http://arkose.local/token"));
        assert!(config.report.url.is_none());
        assert!(config.upstream.http_proxy.is_none());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.upstream.user_agent = "bad\nagent".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.arkose.solver_command = vec!["  ".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.arkose.solver_timeout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_file_wins_over_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("config.toml");
        let default = dir.path().join("home.toml");
        std::fs::write(&local, "[server]\nport = 9001\n").unwrap();
        std::fs::write(&default, "[server]\nport = 9002\n").unwrap();

        let (config, source) = read_config_file(None, &local, &default).unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(source, Some(local));
    }

    #[test]
    fn broken_local_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("config.toml");
        let default = dir.path().join("home.toml");
        std::fs::write(&local, "[server\nport = ").unwrap();
        std::fs::write(&default, "[server]\nport = 9002\n").unwrap();

        let err = read_config_file(None, &local, &default).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "{}", err);
    }

    #[test]
    fn missing_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, source) = read_config_file(
            None,
            &dir.path().join("config.toml"),
            &dir.path().join("home.toml"),
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert!(source.is_none());

        let missing = dir.path().join("explicit.toml");
        assert!(read_config_file(Some(missing), &dir.path().join("config.toml"), &dir.path().join("home.toml")).is_err());
    }
}
