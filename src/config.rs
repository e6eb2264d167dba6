use crate::version;
use anyhow::Error;
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Realtime notification sync client",
    long_about = version::get_version_info()
)]
pub struct Cli {
    #[clap(long, default_value = "notisync.toml")]
    pub conf: Option<String>,
    /// Account to watch; overrides the config file.
    #[clap(long)]
    pub account: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Base URL of the notification REST service.
    pub api_url: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub account: Option<String>,
    /// Page size of the snapshot pull.
    pub snapshot_limit: Option<usize>,
    pub connection: Option<ConnectionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    /// Push channel websocket URL.
    pub ws_url: String,
    pub max_reconnect_attempts: Option<u32>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_max_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn max_reconnect_attempts(&self) -> u32 {
        self.max_reconnect_attempts.unwrap_or(5)
    }
    pub fn backoff_base_ms(&self) -> u64 {
        self.backoff_base_ms.unwrap_or(1000)
    }
    pub fn backoff_max_ms(&self) -> u64 {
        self.backoff_max_ms.unwrap_or(30_000)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080/ws".to_string(),
            max_reconnect_attempts: None,
            backoff_base_ms: None,
            backoff_max_ms: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            account: None,
            snapshot_limit: None,
            connection: Some(ConnectionConfig::default()),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    pub fn snapshot_limit(&self) -> usize {
        self.snapshot_limit.unwrap_or(50)
    }

    pub fn connection(&self) -> ConnectionConfig {
        self.connection.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        let cmd = Cli::command();
        cmd.clone().debug_assert();
        let long_about = cmd.get_long_about().map(|s| s.to_string()).unwrap_or_default();
        assert!(long_about.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.snapshot_limit(), 50);
        let conn = config.connection();
        assert_eq!(conn.max_reconnect_attempts(), 5);
        assert_eq!(conn.backoff_base_ms(), 1000);
        assert_eq!(conn.backoff_max_ms(), 30_000);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
api_url = "https://api.example.com"
account = "acc-1"
snapshot_limit = 20

[connection]
ws_url = "wss://push.example.com/ws"
max_reconnect_attempts = 3
backoff_base_ms = 500
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.account.as_deref(), Some("acc-1"));
        assert_eq!(config.snapshot_limit(), 20);
        let conn = config.connection();
        assert_eq!(conn.ws_url, "wss://push.example.com/ws");
        assert_eq!(conn.max_reconnect_attempts(), 3);
        assert_eq!(conn.backoff_base_ms(), 500);
        assert_eq!(conn.backoff_max_ms(), 30_000);
    }
}
