//! Process-wide logging.
//!
//! Installed once by the first successful `awesome_utils_initialize`. When
//! `log_dir` names an existing directory, lines go to a timestamped file there;
//! otherwise they go to stderr. `RUST_LOG` overrides the configured filter.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::config::BridgeConfig;

static INSTALLED: OnceCell<Option<PathBuf>> = OnceCell::new();

/// Install the global subscriber. Returns the log file path when logging to a file.
///
/// Later calls are no-ops returning the first call's outcome. If the host
/// process already installed a subscriber, that one is kept.
pub fn init(config: &BridgeConfig) -> anyhow::Result<Option<PathBuf>> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .cloned()
}

fn install(config: &BridgeConfig) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("invalid log filter {:?}", config.log_filter))?;

    let log_file = config
        .log_dir
        .as_deref()
        .filter(|dir| dir.is_dir())
        .map(log_file_path);

    let result = match &log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("global subscriber already installed, keeping it");
    }
    tracing::info!("logging initialized");
    Ok(log_file)
}

fn log_file_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    dir.join(format!("ane-awesome-utils-{stamp}.txt"))
}

/// Re-emit a line written by the managed library.
pub fn managed_line(message: &str) {
    tracing::info!(target: "managed", "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let path = log_file_path(Path::new("/tmp"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("ane-awesome-utils-"));
        assert!(name.ends_with(".txt"));
        // ane-awesome-utils-YYYY-MM-DD-HH-MM-SS.txt
        assert_eq!(name.len(), "ane-awesome-utils-".len() + 19 + ".txt".len());
    }
}
