// Runtime configuration, read once at start-up from the environment (after
// `.env` has been loaded).
//
// Required: DISCORD_TOKEN, APP_URL, SC_CLIENT_ID, SC_CLIENT_SECRET
// Optional: DATA_DIR, PORT, DRIVE_RENEW_MARGIN_SECS, DRIVE_SWEEP_INTERVAL_SECS,
//           DRIVE_WATCH_ENABLED
//
// Google credentials are picked up separately by `ServiceAccountAuth::from_env`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Path the SoundCloud OAuth redirect lands on.
pub const SOUNDCLOUD_CALLBACK_PATH: &str = "/soundcloud";

/// Path Drive posts push notifications to.
pub const DRIVE_WEBHOOK_PATH: &str = "/api/google/changes";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_token: String,
    /// Public base URL of this process, without trailing slash.
    pub app_url: String,
    pub soundcloud_client_id: String,
    pub soundcloud_client_secret: String,
    pub data_dir: PathBuf,
    pub port: u16,
    pub drive_renew_margin: Duration,
    pub drive_sweep_interval: Duration,
    pub drive_watch_enabled: bool,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            app_url: required("APP_URL")?.trim_end_matches('/').to_string(),
            soundcloud_client_id: required("SC_CLIENT_ID")?,
            soundcloud_client_secret: required("SC_CLIENT_SECRET")?,
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            port: parse_or(get("PORT"), "PORT", 3000)?,
            drive_renew_margin: Duration::from_secs(parse_or(
                get("DRIVE_RENEW_MARGIN_SECS"),
                "DRIVE_RENEW_MARGIN_SECS",
                300,
            )?),
            drive_sweep_interval: Duration::from_secs(positive(
                parse_or(
                    get("DRIVE_SWEEP_INTERVAL_SECS"),
                    "DRIVE_SWEEP_INTERVAL_SECS",
                    600,
                )?,
                "DRIVE_SWEEP_INTERVAL_SECS",
            )?),
            drive_watch_enabled: parse_or(get("DRIVE_WATCH_ENABLED"), "DRIVE_WATCH_ENABLED", true)?,
        })
    }

    pub fn soundcloud_redirect_uri(&self) -> String {
        format!("{}{}", self.app_url, SOUNDCLOUD_CALLBACK_PATH)
    }

    /// `None` when push notifications are switched off.
    pub fn drive_webhook_address(&self) -> Option<String> {
        self.drive_watch_enabled
            .then(|| format!("{}{}", self.app_url, DRIVE_WEBHOOK_PATH))
    }

    pub fn soundcloud_db_path(&self) -> PathBuf {
        self.data_dir.join("soundcloud.db")
    }
}

fn parse_or<T>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn positive(value: u64, var: &'static str) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
