//! Global tracing setup shared by the CLI and embedders.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::broadcast::LogBroadcaster;

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to bridge log records: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// `RUST_LOG` when set, otherwise `default_directives`.
pub fn build_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Installs the fmt layer, an optional [`LogBroadcaster`] layer and the
/// `log` bridge. Call once per process.
pub fn init(default_directives: &str, broadcaster: Option<LogBroadcaster>) -> Result<(), LoggingError> {
    let subscriber = tracing_subscriber::registry()
        .with(build_filter(default_directives))
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(broadcaster);

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_falls_back_to_default() {
        let original = std::env::var_os("RUST_LOG");
        std::env::remove_var("RUST_LOG");

        assert_eq!(build_filter("debug").to_string(), "debug");

        std::env::set_var("RUST_LOG", "subflow=trace");
        assert_eq!(build_filter("debug").to_string(), "subflow=trace");

        match original {
            Some(value) => std::env::set_var("RUST_LOG", value),
            None => std::env::remove_var("RUST_LOG"),
        }
    }
}
