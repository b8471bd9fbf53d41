//! Bridge configuration, passed as JSON to `awesome_utils_initialize`.
//!
//! ```json
//! {
//!   "library_path": "C:\\app\\META-INF\\ANE\\Windows-x86-64\\AwesomeAneUtils.dll",
//!   "log_dir": "C:\\debug1",
//!   "log_filter": "ane_awesome_utils=debug",
//!   "inbox_limit": 4096,
//!   "overflow_policy": "drop_oldest",
//!   "reap_interval_ms": 1000
//! }
//! ```
//!
//! Every field is optional.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;
use crate::queue::{MessageQueue, OverflowPolicy};

pub const DEFAULT_LOG_FILTER: &str = "ane_awesome_utils=info";
const DEFAULT_REAP_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Managed library location. Defaults to the platform file name next to this module.
    pub library_path: Option<PathBuf>,
    /// Directory for the log file. Logs go to stderr when unset or missing.
    pub log_dir: Option<PathBuf>,
    pub log_filter: String,
    /// Maximum frames queued per session; `None` keeps inboxes unbounded.
    pub inbox_limit: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    /// Reaper period in milliseconds; 0 disables the periodic sweep.
    pub reap_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            log_dir: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            inbox_limit: None,
            overflow_policy: OverflowPolicy::default(),
            reap_interval_ms: DEFAULT_REAP_INTERVAL_MS,
        }
    }
}

impl BridgeConfig {
    /// Parse a JSON config. Blank input yields the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(json)?)
    }

    /// Build an inbox honouring `inbox_limit` / `overflow_policy`.
    pub fn new_inbox(&self) -> MessageQueue {
        match self.inbox_limit {
            Some(limit) => MessageQueue::bounded(limit, self.overflow_policy),
            None => MessageQueue::new(),
        }
    }

    pub fn reap_interval(&self) -> Option<Duration> {
        (self.reap_interval_ms > 0).then(|| Duration::from_millis(self.reap_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::queue::Enqueued;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_json("").unwrap();
        assert!(config.library_path.is_none());
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.inbox_limit, None);
        assert_eq!(config.reap_interval(), Some(Duration::from_millis(1000)));

        let config = BridgeConfig::from_json("{}").unwrap();
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldest);
    }

    #[test]
    fn test_full_config() {
        let config = BridgeConfig::from_json(
            r#"{
                "library_path": "/opt/ane/AwesomeAneUtils.so",
                "log_dir": "/tmp/ane-logs",
                "log_filter": "ane_awesome_utils=trace",
                "inbox_limit": 2,
                "overflow_policy": "reject_new",
                "reap_interval_ms": 0
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.library_path.as_deref(),
            Some(std::path::Path::new("/opt/ane/AwesomeAneUtils.so"))
        );
        assert_eq!(config.overflow_policy, OverflowPolicy::RejectNew);
        assert_eq!(config.reap_interval(), None);

        let inbox = config.new_inbox();
        inbox.enqueue(vec![1]);
        inbox.enqueue(vec![2]);
        assert_eq!(inbox.enqueue(vec![3]), Enqueued::Rejected);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            BridgeConfig::from_json("not json"),
            Err(BridgeError::Config(_))
        ));
        assert!(BridgeConfig::from_json(r#"{"overflow_policy":"sometimes"}"#).is_err());
    }
}
