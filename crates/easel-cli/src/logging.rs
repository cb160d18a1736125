//! tracing-subscriber の初期化。ログは stderr、レポート JSON は stdout に出す。

use anyhow::Context as _;
use easel_core::{LogFormat, RuntimeConfig};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured filter when set.
pub fn init(config: &RuntimeConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)
            .with_context(|| format!("invalid log filter '{}'", config.log_filter))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = match config.log_format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("install tracing subscriber: {e}"))
}
