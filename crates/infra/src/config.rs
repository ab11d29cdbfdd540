//! Process configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `PROPCRM_DEFAULT_CURRENCY` | `CLP` |
//! | `PROPCRM_DEFAULT_COMMISSION` | `0` (percent) |
//! | `PROPCRM_LOG_FORMAT` | `json` |
//! | `PROPCRM_LOG` | `RUST_LOG`, then `info` |
//!
//! Call [`Config::init_logging`] once at startup to install the subscriber.

use thiserror::Error;

use propcrm_core::{Currency, DomainError, Percentage};
use propcrm_observability::{LogConfig, LogFormat, LogFormatError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: invalid currency: {source}")]
    Currency {
        var: &'static str,
        #[source]
        source: DomainError,
    },

    #[error("{var}: invalid commission percentage: {source}")]
    Commission {
        var: &'static str,
        #[source]
        source: DomainError,
    },

    #[error("{var}: {source}")]
    LogFormat {
        var: &'static str,
        #[source]
        source: LogFormatError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Currency used when an amount arrives without one.
    pub default_currency: Currency,
    /// Commission applied when a new offer does not specify one.
    pub default_commission: Percentage,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_currency: Currency::CLP,
            default_commission: Percentage::ZERO,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub const DEFAULT_CURRENCY_VAR: &'static str = "PROPCRM_DEFAULT_CURRENCY";
    pub const DEFAULT_COMMISSION_VAR: &'static str = "PROPCRM_DEFAULT_COMMISSION";
    pub const LOG_FORMAT_VAR: &'static str = "PROPCRM_LOG_FORMAT";
    pub const LOG_FILTER_VAR: &'static str = "PROPCRM_LOG";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`Config::from_env`] with an injectable variable source.
    ///
    /// Unset and blank variables take their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(code) = get(Self::DEFAULT_CURRENCY_VAR) {
            config.default_currency =
                Currency::parse(&code).map_err(|source| ConfigError::Currency {
                    var: Self::DEFAULT_CURRENCY_VAR,
                    source,
                })?;
        }

        if let Some(pct) = get(Self::DEFAULT_COMMISSION_VAR) {
            config.default_commission =
                Percentage::parse(&pct).map_err(|source| ConfigError::Commission {
                    var: Self::DEFAULT_COMMISSION_VAR,
                    source,
                })?;
        }

        if let Some(format) = get(Self::LOG_FORMAT_VAR) {
            config.log.format = format.parse::<LogFormat>().map_err(|source| {
                ConfigError::LogFormat {
                    var: Self::LOG_FORMAT_VAR,
                    source,
                }
            })?;
        }

        config.log.filter = get(Self::LOG_FILTER_VAR).or_else(|| get("RUST_LOG"));

        Ok(config)
    }

    /// Install the process-wide tracing subscriber described by `log`.
    ///
    /// Later calls keep the first subscriber.
    pub fn init_logging(&self) {
        propcrm_observability::init(&self.log);
    }
}
