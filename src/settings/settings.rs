use crate::application_port::LifecycleConfig;
use crate::infra_gotrue::GoTrueConfig;
use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub lifecycle: Lifecycle,
    pub auth: Auth,
    pub gotrue: Option<GoTrue>,
    pub http: Http,
    pub log: Log,
}

/// Intervals in milliseconds.
#[derive(Debug, Deserialize)]
pub struct Lifecycle {
    pub buffer_ms: u64,
    pub min_refresh_interval_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Lifecycle {
    pub fn to_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            buffer: Duration::from_millis(self.buffer_ms),
            min_refresh_interval: Duration::from_millis(self.min_refresh_interval_ms),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub backend: String, // "fake" or "gotrue"
    /// Lifetime of sessions issued by the fake backend.
    pub fake_session_ttl_secs: Option<i64>,
}

#[derive(Deserialize)]
pub struct GoTrue {
    pub url: String,
    pub anon_key: String,
    pub refresh_token: Option<String>,
    pub timeout_ms: u64,
}

impl GoTrue {
    pub fn to_config(&self) -> GoTrueConfig {
        GoTrueConfig {
            url: self.url.clone(),
            anon_key: self.anon_key.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

// Keeps keys and tokens out of the startup log.
impl std::fmt::Debug for GoTrue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoTrue")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
