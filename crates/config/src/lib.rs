use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "taskboard.toml",
    "config/taskboard.toml",
    "crates/config/taskboard.toml",
    "../taskboard.toml",
    "../config/taskboard.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

/// Where the Backend API lives and how the client talks to it.
///
/// ```
/// use taskboard_config::ApiConfig;
///
/// let api = ApiConfig::default();
/// assert_eq!(api.base_url, "http://localhost:8080");
/// assert_eq!(api.request_timeout_seconds, 10);
/// assert_eq!(api.page_size, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ApiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "ApiConfig::default_page_size")]
    pub page_size: u32,
    #[serde(default = "ApiConfig::default_message_page_size")]
    pub message_page_size: u32,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "http://localhost:8080".to_string()
    }

    const fn default_request_timeout() -> u64 {
        10
    }

    const fn default_page_size() -> u32 {
        20
    }

    const fn default_message_page_size() -> u32 {
        50
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
            page_size: Self::default_page_size(),
            message_page_size: Self::default_message_page_size(),
        }
    }
}

/// Socket path and reconnect policy for the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_path")]
    pub path: String,
    #[serde(default = "RealtimeConfig::default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Delay unit multiplied by the attempt number between reconnects.
    #[serde(default = "RealtimeConfig::default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Upper bound on one socket open, TCP connect through upgrade response.
    #[serde(default = "RealtimeConfig::default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

impl RealtimeConfig {
    fn default_path() -> String {
        "/ws".to_string()
    }

    const fn default_max_reconnect_attempts() -> u32 {
        5
    }

    const fn default_backoff_unit_ms() -> u64 {
        1_000
    }

    const fn default_handshake_timeout_ms() -> u64 {
        10_000
    }

    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            max_reconnect_attempts: Self::default_max_reconnect_attempts(),
            backoff_unit_ms: Self::default_backoff_unit_ms(),
            handshake_timeout_ms: Self::default_handshake_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "IdentityConfig::default_device_id_path")]
    pub device_id_path: String,
}

impl IdentityConfig {
    fn default_device_id_path() -> String {
        "device_id".to_string()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            device_id_path: Self::default_device_id_path(),
        }
    }
}

/// Load the client configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use taskboard_config::load;
///
/// std::env::remove_var("TASKBOARD_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.api.base_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("api.base_url", defaults.api.base_url.clone())?
        .set_default(
            "api.request_timeout_seconds",
            i64::try_from(defaults.api.request_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default("api.page_size", i64::from(defaults.api.page_size))?
        .set_default(
            "api.message_page_size",
            i64::from(defaults.api.message_page_size),
        )?
        .set_default("realtime.path", defaults.realtime.path.clone())?
        .set_default(
            "realtime.max_reconnect_attempts",
            i64::from(defaults.realtime.max_reconnect_attempts),
        )?
        .set_default(
            "realtime.backoff_unit_ms",
            i64::try_from(defaults.realtime.backoff_unit_ms).unwrap_or(i64::MAX),
        )?
        .set_default(
            "realtime.handshake_timeout_ms",
            i64::try_from(defaults.realtime.handshake_timeout_ms).unwrap_or(i64::MAX),
        )?
        .set_default(
            "identity.device_id_path",
            defaults.identity.device_id_path.clone(),
        )?;

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("TASKBOARD_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via TASKBOARD_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(config::Environment::with_prefix("TASKBOARD").separator("__"));

    let cfg = builder.build().context("unable to build configuration")?;

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    debug!(?config, "loaded client configuration");
    Ok(config)
}
