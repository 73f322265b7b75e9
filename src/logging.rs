use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Install the stderr logger. `RUST_LOG` takes precedence over `level`.
///
/// Stdout is reserved for the child's output, so nothing here may write there.
pub fn init(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level `{level}`"))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .try_init()
        .map_err(|e| anyhow!("failed to install logger: {e}"))
}
