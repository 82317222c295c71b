//! Service configuration read from `FLEET_*` environment variables.

use fleet_cost::{RetributionDefaults, TermsViolation};
use rust_decimal::Decimal;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("configured retribution defaults are out of range: {0}")]
    Defaults(#[from] TermsViolation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub http_addr: SocketAddr,
    /// SQLite ledger file; the in-memory ledger is used when unset.
    pub db_path: Option<PathBuf>,
    /// JSON catalog of projects and equipment loaded at startup.
    pub catalog_path: Option<PathBuf>,
    pub defaults: RetributionDefaults,
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            db_path: None,
            catalog_path: None,
            defaults: RetributionDefaults::default(),
            log_json: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let http_addr = var("FLEET_HTTP_ADDR").unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string());
        let http_addr = http_addr
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidValue {
                name: "FLEET_HTTP_ADDR",
                value: http_addr.clone(),
                reason: err.to_string(),
            })?;

        let fallback = RetributionDefaults::default();
        let defaults = RetributionDefaults {
            percentage: parse_decimal(
                "FLEET_DEFAULT_PERCENTAGE",
                var("FLEET_DEFAULT_PERCENTAGE"),
                fallback.percentage,
            )?,
            fixed_rate: parse_decimal(
                "FLEET_DEFAULT_FIXED_RATE",
                var("FLEET_DEFAULT_FIXED_RATE"),
                fallback.fixed_rate,
            )?,
        };
        defaults.validate()?;

        Ok(Self {
            http_addr,
            db_path: var("FLEET_DB_PATH").map(PathBuf::from),
            catalog_path: var("FLEET_CATALOG_PATH").map(PathBuf::from),
            defaults,
            log_json: parse_bool("FLEET_LOG_JSON", var("FLEET_LOG_JSON"), false)?,
        })
    }
}

fn parse_decimal(
    name: &'static str,
    raw: Option<String>,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<Decimal>()
            .map_err(|err| ConfigError::InvalidValue {
                name,
                reason: err.to_string(),
                value,
            }),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref() {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes" | "YES") => Ok(true),
        Some("0" | "false" | "FALSE" | "no" | "NO") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            name,
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
