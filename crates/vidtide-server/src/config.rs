use std::path::PathBuf;

use anyhow::{Context, Result};

/// Runtime configuration, read from the environment with dev defaults.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    pub media_dir: PathBuf,
    pub media_base_url: String,
    pub spool_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: var_or("VIDTIDE_HOST", "0.0.0.0"),
            port: parse_var("VIDTIDE_PORT", "3000")?,
            db_path: var_or("VIDTIDE_DB_PATH", "vidtide.db").into(),
            access_secret: var_or("VIDTIDE_ACCESS_TOKEN_SECRET", "dev-access-secret-change-me"),
            refresh_secret: var_or(
                "VIDTIDE_REFRESH_TOKEN_SECRET",
                "dev-refresh-secret-change-me",
            ),
            // 15 minutes / 10 days
            access_ttl_secs: parse_var("VIDTIDE_ACCESS_TOKEN_TTL_SECS", "900")?,
            refresh_ttl_secs: parse_var("VIDTIDE_REFRESH_TOKEN_TTL_SECS", "864000")?,
            media_dir: var_or("VIDTIDE_MEDIA_DIR", "./media").into(),
            media_base_url: var_or("VIDTIDE_MEDIA_BASE_URL", "/media"),
            spool_dir: var_or("VIDTIDE_SPOOL_DIR", "./spool").into(),
            request_timeout_secs: parse_var("VIDTIDE_REQUEST_TIMEOUT_SECS", "30")?,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var_or(name, default)
        .parse()
        .with_context(|| format!("invalid value for {name}"))
}
