//! Logging and tracing setup

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Initialize logging and tracing
///
/// `RUST_LOG` takes precedence over the configured level. When a log file is
/// configured the returned guard must be held until exit so buffered lines
/// are written.
pub fn initialize_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    // Set up environment filter
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (fmt_layer, guard) = match &config.file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path
                .file_name()
                .with_context(|| format!("Log file path has no file name: {:?}", path))?;
            let appender = tracing_appender::rolling::never(
                directory.unwrap_or_else(|| std::path::Path::new(".")),
                file_name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (format_layer(&config.format, writer, false), Some(guard))
        }
        None => (format_layer(&config.format, std::io::stdout, true), None),
    };

    // Initialize the subscriber
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn format_layer<S, W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        "json" => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        "pretty" => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(false)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(ansi)
            .boxed(),
        _ => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .with_thread_names(true)
            .with_ansi(ansi)
            .boxed(),
    }
}
