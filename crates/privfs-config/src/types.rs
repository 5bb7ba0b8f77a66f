//! Configuration structs. Field defaults mirror `defaults.toml`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub broker: BrokerSection,
    /// Subject and stream naming.
    pub subjects: SubjectsSection,
    /// Work-queue behavior.
    pub queue: QueueSection,
    /// Caller-side reply deadlines.
    pub timeouts: TimeoutsSection,
    /// Upload staging housekeeping.
    pub uploads: UploadsSection,
    /// Log output.
    pub logging: LoggingSection,
}

/// `[broker]`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    /// Server URL.
    pub url: String,
    /// Account user.
    pub user: String,
    /// Account password.
    pub password: String,
    /// Fixed wait between reconnect attempts.
    pub reconnect_wait_secs: u64,
    /// Name reported to the server.
    pub client_name: String,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_owned(),
            user: "worker".to_owned(),
            password: "privfs-worker-dev".to_owned(),
            reconnect_wait_secs: 5,
            client_name: "privfs-worker".to_owned(),
        }
    }
}

impl BrokerSection {
    /// Reconnect wait as a [`Duration`].
    #[must_use]
    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_secs(self.reconnect_wait_secs)
    }
}

impl fmt::Debug for BrokerSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerSection")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"***")
            .field("reconnect_wait_secs", &self.reconnect_wait_secs)
            .field("client_name", &self.client_name)
            .finish()
    }
}

/// `[subjects]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectsSection {
    /// Prefix for `<root>.fs.<verb>` subjects.
    pub root: String,
    /// Prefix for `<events_root>.job.<jobId>` subjects.
    pub events_root: String,
    /// Work-queue stream name.
    pub stream: String,
    /// Durable consumer name.
    pub consumer: String,
}

impl Default for SubjectsSection {
    fn default() -> Self {
        Self {
            root: "privfs.root".to_owned(),
            events_root: "privfs.events".to_owned(),
            stream: "PRIVFS_TASKS".to_owned(),
            consumer: "privfs-root-worker".to_owned(),
        }
    }
}

/// `[queue]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// Total delivery attempts per task message.
    pub max_deliver: u32,
    /// Bounded wait for one fetch.
    pub fetch_wait_secs: u64,
    /// Pause after a fetch error other than timeout.
    pub fetch_backoff_ms: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            max_deliver: 3,
            fetch_wait_secs: 5,
            fetch_backoff_ms: 1000,
        }
    }
}

impl QueueSection {
    /// Fetch wait as a [`Duration`].
    #[must_use]
    pub fn fetch_wait(&self) -> Duration {
        Duration::from_secs(self.fetch_wait_secs)
    }

    /// Fetch backoff as a [`Duration`].
    #[must_use]
    pub fn fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.fetch_backoff_ms)
    }
}

/// `[timeouts]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsSection {
    /// JSON request/reply operations.
    pub sync_secs: u64,
    /// Binary read and chunk write.
    pub binary_secs: u64,
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            sync_secs: 10,
            binary_secs: 30,
        }
    }
}

impl TimeoutsSection {
    /// Sync deadline.
    #[must_use]
    pub fn sync(&self) -> Duration {
        Duration::from_secs(self.sync_secs)
    }

    /// Binary deadline.
    #[must_use]
    pub fn binary(&self) -> Duration {
        Duration::from_secs(self.binary_secs)
    }
}

/// `[uploads]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsSection {
    /// Idle time after which a receiving upload is abandoned.
    pub stale_after_secs: u64,
    /// How often abandoned uploads are swept.
    pub sweep_interval_secs: u64,
}

impl Default for UploadsSection {
    fn default() -> Self {
        Self {
            stale_after_secs: 21_600,
            sweep_interval_secs: 600,
        }
    }
}

impl UploadsSection {
    /// Staleness threshold.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Sweep period.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// `stdout`, `stderr` or `file`.
    pub target: String,
    /// Log directory when `target = "file"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Per-target overrides such as `privfs_bus=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: None,
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_broker_password() {
        let broker = BrokerSection {
            password: "hunter2".to_owned(),
            ..BrokerSection::default()
        };
        let rendered = format!("{broker:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str("[queue]\nmax_deliver = 5\n").unwrap();
        assert_eq!(config.queue.max_deliver, 5);
        assert_eq!(config.queue.fetch_wait(), Duration::from_secs(5));
        assert_eq!(config.subjects, SubjectsSection::default());
    }
}
