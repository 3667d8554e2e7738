//! Reloadable tracing setup, grounded on `rust-srec`'s `logging` module: a
//! local-timezone formatter, a non-blocking file appender alongside stdout,
//! and a filter handle the process can reload without restarting.

use std::path::Path;

use chrono::Local;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

pub const DEFAULT_LOG_FILTER: &str = "loadgen_scheduler=info,sqlx=warn";

pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub struct LoggingConfig {
    handle: FilterHandle,
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

impl LoggingConfig {
    pub fn reload_filter(&self, directive: &str) -> Result<(), reload::Error> {
        let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        self.handle.reload(filter)
    }
}

/// Installs the global subscriber. Must be called exactly once, from
/// `main`, before any other component logs.
pub fn init_logging(log_dir: &Path) -> anyhow::Result<LoggingConfig> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "loadgen-scheduler.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter, handle) = reload::Layer::new(env_filter);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(LocalTimer)
        .with_writer(non_blocking)
        .with_ansi(false);

    let stdout_layer = tracing_subscriber::fmt::layer().with_timer(LocalTimer);

    Registry::default()
        .with(filter)
        .with(stdout_layer)
        .with(fmt_layer)
        .try_init()?;

    Ok(LoggingConfig { handle, _guard: guard })
}
