//! Runtime configuration.
//!
//! TOML ファイルまたは環境変数から読み込みます。すべての項目に既定値があります。
//!
//! | key | env | default |
//! |---|---|---|
//! | `log_filter` | `EASEL_LOG` | `"info"` |
//! | `log_format` | `EASEL_LOG_FORMAT` | `compact` |
//! | `sweep_on_shutdown` | `EASEL_SWEEP_ON_SHUTDOWN` | `true` |
//! | `queue_warn_depth` | `EASEL_QUEUE_WARN_DEPTH` | `64` |

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{EaselError, EaselResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = EaselError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(EaselError::Config(format!(
                "log format must be 'compact' or 'pretty', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Collect every remaining item when the runtime shuts down.
    pub sweep_on_shutdown: bool,
    /// Pending jobs on one item before a warning is logged.
    pub queue_warn_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Compact,
            sweep_on_shutdown: true,
            queue_warn_depth: 64,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(text: &str) -> EaselResult<Self> {
        toml::from_str(text).map_err(|e| EaselError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> EaselResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EaselError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `EASEL_*` environment variables.
    pub fn from_env() -> EaselResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EaselResult<Self> {
        let mut config = Self::default();
        if let Some(filter) = lookup("EASEL_LOG") {
            config.log_filter = filter;
        }
        if let Some(format) = lookup("EASEL_LOG_FORMAT") {
            config.log_format = format.parse()?;
        }
        if let Some(sweep) = lookup("EASEL_SWEEP_ON_SHUTDOWN") {
            config.sweep_on_shutdown = parse_var("EASEL_SWEEP_ON_SHUTDOWN", &sweep)?;
        }
        if let Some(depth) = lookup("EASEL_QUEUE_WARN_DEPTH") {
            config.queue_warn_depth = parse_var("EASEL_QUEUE_WARN_DEPTH", &depth)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EaselResult<()> {
        if self.queue_warn_depth == 0 {
            return Err(EaselError::Config(
                "queue_warn_depth must be at least 1".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(EaselError::Config("log_filter must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, raw: &str) -> EaselResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EaselError::Config(format!("{name}={raw}: {e}")))
}
