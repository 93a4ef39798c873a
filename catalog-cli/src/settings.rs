use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use catalog_client::ClientSettings;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api/v1";
pub const DEFAULT_ASSET_ORIGIN: &str = "http://127.0.0.1:8000";
pub const DEFAULT_SESSION_FILE: &str = ".catalog_session.json";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub asset_origin: String,
    pub http_timeout_secs: u64,
    pub session_file: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = normalize_server(
            non_empty(lookup("CATALOG_API_URL")).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        );
        let asset_origin = non_empty(lookup("CATALOG_ASSET_ORIGIN"))
            .unwrap_or_else(|| DEFAULT_ASSET_ORIGIN.to_string());
        let http_timeout_secs = parse_positive(
            "CATALOG_HTTP_TIMEOUT_SECS",
            lookup("CATALOG_HTTP_TIMEOUT_SECS"),
            10,
        )?;
        let session_file = non_empty(lookup("CATALOG_SESSION_FILE"))
            .unwrap_or_else(|| DEFAULT_SESSION_FILE.to_string())
            .into();
        let log_level = non_empty(lookup("LOG_LEVEL")).unwrap_or_else(|| "info".to_string());

        Ok(Self {
            api_url,
            asset_origin,
            http_timeout_secs,
            session_file,
            log_level,
        })
    }

    /// Флаг `--server` важнее переменной окружения.
    pub fn with_server(mut self, server: Option<String>) -> Self {
        if let Some(server) = non_empty(server) {
            self.api_url = normalize_server(server);
        }
        self
    }

    pub fn client_settings(&self) -> ClientSettings {
        let mut settings = ClientSettings::new(self.api_url.clone());
        settings.timeout = Duration::from_secs(self.http_timeout_secs);
        settings.asset_origin = self.asset_origin.clone();
        settings
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive(key: &str, raw: Option<String>, default: u64) -> Result<u64> {
    let value = match non_empty(raw) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}, expecting positive integer"))?,
        None => default,
    };

    if value == 0 {
        return Err(anyhow!("{key} must be > 0"));
    }
    Ok(value)
}

pub fn normalize_server(server: String) -> String {
    let server = server.trim_end_matches('/').to_string();
    if server.starts_with("http://") || server.starts_with("https://") {
        return server;
    }

    format!("http://{server}")
}
