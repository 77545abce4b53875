use std::fs;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;
use crate::constants::APP_NAME;

/// Default filter directive; `RUST_LOG` takes precedence when set.
pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{APP_NAME}={level}")
}

/// Initializes console logging on stderr, plus a daily-rolling JSON log file
/// when `settings.json_file` is on.
///
/// The returned guard flushes the file writer when dropped, so hold it for
/// the life of the process. Calling this twice leaves the first subscriber in place.
pub fn init_logging(settings: &LoggingSettings, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .context("invalid log filter")?;

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = if settings.json_file {
        fs::create_dir_all(&settings.dir)
            .with_context(|| format!("failed to create log directory {}", settings.dir.display()))?;
        let file_appender = tracing_appender::rolling::daily(&settings.dir, &settings.file);
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        (Some(fmt::layer().json().with_writer(writer)), Some(guard))
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_switches_to_debug() {
        assert_eq!(default_directive(false), "foundation=info");
        assert_eq!(default_directive(true), "foundation=debug");
    }

    #[test]
    fn file_layer_creates_the_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let settings = LoggingSettings {
            dir: dir.path().join("logs"),
            file: "test.log".into(),
            json_file: true,
        };
        let guard = init_logging(&settings, false).unwrap();
        assert!(guard.is_some());
        assert!(settings.dir.is_dir());
    }
}
