//! Tracing setup: console output plus an optional rolling security log

use std::fs;

use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Target used by authentication and audit events
pub const SECURITY_TARGET: &str = "security";

const SECURITY_LOG_FILE: &str = "security.log";

/// Directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    format!("libris_server={level},tower_http=info,{SECURITY_TARGET}=info,sqlx=warn")
}

/// Install the global subscriber.
///
/// The returned guard flushes the security log and must live until shutdown.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(&config.level))?,
    };

    let mut layers = Vec::new();

    if config.format.eq_ignore_ascii_case("json") {
        layers.push(fmt::layer().json().with_current_span(false).boxed());
    } else {
        layers.push(fmt::layer().boxed());
    }

    let guard = match config.security_log_dir {
        Some(ref dir) => {
            fs::create_dir_all(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, SECURITY_LOG_FILE));

            layers.push(
                fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(Targets::new().with_target(SECURITY_TARGET, Level::WARN))
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry().with(filter).with(layers).try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        let directives = default_directives("debug");
        assert!(directives.contains("libris_server=debug"));
        assert!(directives.contains("security=info"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
