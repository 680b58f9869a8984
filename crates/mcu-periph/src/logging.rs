//! Diagnostics output.
//!
//! The library only emits `tracing` events. Applications that don't set up
//! their own subscriber can call [`init`] to print them to stderr, filtered
//! by `MCU_PERIPH_LOG` (default `info`), or [`init_from`] to use the `log`
//! directives of an already loaded [`Config`].

use core::str::FromStr;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use crate::config::{Config, ENV_LOG};
use crate::error::{Error, Result};

/// Verbosity names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    /// Per-character URI scanning and the like.
    Verbose,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Verbose => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "verbose" | "trace" => Ok(LogLevel::Verbose),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// Build the filter from `directives`, or from `MCU_PERIPH_LOG` when
/// `None`. A bare level name such as `verbose` is accepted too.
pub fn filter(directives: Option<&str>) -> EnvFilter {
    let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
    match directives {
        Some(d) => match d.parse::<LogLevel>() {
            Ok(level) => builder.parse_lossy(level.as_filter().to_string()),
            Err(_) => builder.parse_lossy(d),
        },
        None => builder.with_env_var(ENV_LOG).from_env_lossy(),
    }
}

/// Filter for the `log` directives of `config`, `info` when unset.
pub fn config_filter(config: &Config) -> EnvFilter {
    filter(Some(config.log.as_deref().unwrap_or("info")))
}

/// Install a stderr subscriber filtered by `MCU_PERIPH_LOG`.
///
/// Does nothing if a global subscriber is already set.
pub fn init() {
    let _ = try_init(None);
}

/// Install a stderr subscriber; fails with [`Error::Busy`] if a global
/// subscriber is already set.
pub fn try_init(directives: Option<&str>) -> Result<()> {
    install(filter(directives))
}

/// Install a stderr subscriber filtered as `config` says.
pub fn init_from(config: &Config) -> Result<()> {
    install(config_filter(config))
}

fn install(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| Error::Busy)
}
