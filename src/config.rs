use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::{DEFAULT_SLOT_STEP_MINUTES, EngineConfig};
use crate::limits::{MAX_SLOT_STEP_MINUTES, MIN_SLOT_STEP_MINUTES};

const PREFIX: &str = "SLOTWISE_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse {var}={value:?}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
    #[error("both SLOTWISE_TLS_CERT and SLOTWISE_TLS_KEY must be set, or neither")]
    PartialTls,
}

/// Process settings, read from `SLOTWISE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `lookup` receives the full variable name, prefix included.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(&format!("{PREFIX}{key}"));

        let tls_cert = get("TLS_CERT");
        let tls_key = get("TLS_KEY");
        if tls_cert.is_some() != tls_key.is_some() {
            return Err(ConfigError::PartialTls);
        }

        let slot_step_minutes = parse_or(&get, "SLOT_STEP_MINUTES", DEFAULT_SLOT_STEP_MINUTES)?;
        if !(MIN_SLOT_STEP_MINUTES..=MAX_SLOT_STEP_MINUTES).contains(&slot_step_minutes) {
            return Err(ConfigError::Invalid {
                var: format!("{PREFIX}SLOT_STEP_MINUTES"),
                value: slot_step_minutes.to_string(),
                reason: format!("must be within {MIN_SLOT_STEP_MINUTES}..={MAX_SLOT_STEP_MINUTES}"),
            });
        }

        Ok(Self {
            bind: get("BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&get, "PORT", 5433)?,
            data_dir: get("DATA_DIR").map_or_else(|| PathBuf::from("./data"), PathBuf::from),
            password: get("PASSWORD").unwrap_or_else(|| "slotwise".into()),
            max_connections: parse_or(&get, "MAX_CONNECTIONS", 256)?,
            compact_threshold: parse_or(&get, "COMPACT_THRESHOLD", 1000)?,
            metrics_port: parse_opt(&get, "METRICS_PORT")?,
            tls_cert,
            tls_key,
            engine: EngineConfig {
                slot_step_minutes,
                require_cancellation_reason: parse_or(&get, "REQUIRE_CANCELLATION_REASON", true)?,
            },
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
        var: format!("{PREFIX}{key}"),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_opt(get, key)?.unwrap_or(default))
}
