use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Settings of the `dynconf-watcher` binary
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// How often the current settings are printed, in milliseconds
    #[serde(default = "default_print_interval")]
    pub print_interval_in_ms: u64,

    /// Write logs to `<log_dir>/watcher.log` instead of stderr
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            print_interval_in_ms: default_print_interval(),
            log_dir: None,
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.print_interval_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watcher.print_interval_in_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn print_interval(&self) -> Duration {
        Duration::from_millis(self.print_interval_in_ms)
    }
}

fn default_print_interval() -> u64 {
    5_000
}
