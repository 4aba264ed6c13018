//! Tracing setup for the `edition` binary.
//!
//! Logs go to stderr (compact or JSON) and, when `logging.log_dir` is set,
//! also to a daily `edition_YYYYMMDD.log` file in that directory.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ed_domain::config::LoggingConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// File name for the log of a given day.
pub fn log_file_name(date: chrono::NaiveDate) -> String {
    format!("edition_{}.log", date.format("%Y%m%d"))
}

/// Path of today's log file under `dir`.
pub fn daily_log_path(dir: &Path) -> PathBuf {
    dir.join(log_file_name(chrono::Local::now().date_naive()))
}

fn open_log_file(dir: &Path) -> anyhow::Result<File> {
    std::fs::create_dir_all(dir)
        .map_err(|e| anyhow::anyhow!("creating log directory {}: {e}", dir.display()))?;
    let path = daily_log_path(dir);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| anyhow::anyhow!("opening log file {}: {e}", path.display()))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// filter; `verbose` forces debug output for the edition crates.
pub fn init_tracing(cfg: &LoggingConfig, verbose: bool) -> anyhow::Result<()> {
    let default_filter = if verbose {
        "info,ed_providers=debug,ed_llm=debug,ed_context=debug"
    } else {
        cfg.filter.as_str()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = if cfg.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().compact().with_writer(std::io::stderr).boxed()
    };

    let file_layer = match &cfg.log_dir {
        Some(dir) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(dir)?))
                .boxed(),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()?;
    Ok(())
}
