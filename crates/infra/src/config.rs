//! Configuration loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use scholaris_observability::{LogFormat, LogSettings};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_DIRECTORY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScholarisConfig {
    /// Base URL of the directory API (no trailing slash).
    pub api_url: String,
    /// Bearer token obtained at login.
    pub api_token: Option<String>,
    /// Upper bound for every directory call made while resolving a session.
    pub directory_timeout: Duration,
    /// Where the JSON session store keeps the selected school.
    pub session_file: PathBuf,
    pub log: LogSettings,
}

impl ScholarisConfig {
    /// Load from process environment, reading `.env` first when present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_url = lookup("SCHOLARIS_API_URL")
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let api_token = lookup("SCHOLARIS_API_TOKEN").filter(|t| !t.trim().is_empty());

        let timeout_ms = match lookup("SCHOLARIS_DIRECTORY_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("invalid SCHOLARIS_DIRECTORY_TIMEOUT_MS '{raw}'"))?,
            None => DEFAULT_DIRECTORY_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            anyhow::bail!("SCHOLARIS_DIRECTORY_TIMEOUT_MS must be greater than zero");
        }

        let session_file = match lookup("SCHOLARIS_SESSION_FILE") {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
            _ => default_session_file(),
        };

        let mut log = LogSettings::default();
        if let Some(filter) = lookup("SCHOLARIS_LOG").filter(|f| !f.trim().is_empty()) {
            log = log.with_filter(filter.trim());
        }
        if let Some(raw) = lookup("SCHOLARIS_LOG_FORMAT") {
            log = log.with_format(parse_log_format(&raw)?);
        }

        Ok(Self {
            api_url,
            api_token,
            directory_timeout: Duration::from_millis(timeout_ms),
            session_file,
            log,
        })
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" | "text" => Ok(LogFormat::Pretty),
        other => anyhow::bail!("SCHOLARIS_LOG_FORMAT must be 'json' or 'pretty', got '{other}'"),
    }
}

fn default_session_file() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scholaris")
        .join("session.json")
}
