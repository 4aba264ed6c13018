use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Log output settings. `RUST_LOG` overrides `filter` when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "d_filter")]
    pub filter: String,
    /// Emit JSON lines instead of the compact human format.
    #[serde(default)]
    pub json: bool,
    /// Directory for a daily `edition_YYYYMMDD.log` file. Stderr only
    /// when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: d_filter(),
            json: false,
            log_dir: None,
        }
    }
}

fn d_filter() -> String {
    "warn".into()
}
