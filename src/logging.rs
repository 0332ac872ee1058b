//! Tracing subscriber setup

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Unknown values fall back to a single never-rotated file.
fn rotation_for(name: &str) -> Rotation {
    match name.to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber: rolling file output, plus stdout in text mode.
///
/// `RUST_LOG` overrides `log_level`. Keep the returned guard alive for the
/// life of the process or buffered lines are lost on exit.
pub fn init_logging(config: &AppConfig) -> Result<WorkerGuard, InitError> {
    let appender = RollingFileAppender::builder()
        .rotation(rotation_for(&config.rotation))
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    // sqlx logs every statement at info
    let directives = format!("{},sqlx=warn,hyper=warn", config.log_level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let registry = tracing_subscriber::registry().with(filter);
    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false))
            .init();
    }

    Ok(guard)
}
