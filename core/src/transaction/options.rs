use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Intended concurrent-visibility semantics of a transaction.
///
/// Recorded on every context but not enforced: the store offers read-committed visibility of
/// published values and nothing stronger, whatever level is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Per-transaction configuration.
///
/// Deserializing is lenient: any field left out keeps its default, so a configuration file only
/// needs to name what it overrides.
///
/// ```rust
/// use std::time::Duration;
/// use txstore_core::transaction::TransactionOptions;
///
/// let options: TransactionOptions = serde_json::from_str(r#"{ "auto_retry": true, "retry_delay_ms": 50 }"#).unwrap();
/// assert!(options.auto_retry);
/// assert_eq!(options.retry_delay, Duration::from_millis(50));
/// assert_eq!(options.max_retries, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// How long a transaction may stay pending before the watchdog rolls it back
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    pub auto_retry: bool,
    /// Additional attempts after the first failure, when `auto_retry` is set
    pub max_retries: u32,
    /// Fixed pause before each retry
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    /// Not enforced
    pub optimistic_locking: bool,
    /// Not enforced
    pub isolation_level: IsolationLevel,
}

impl TransactionOptions {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables automatic retry with up to `max_retries` further attempts
    pub fn with_auto_retry(mut self, max_retries: u32) -> Self {
        self.auto_retry = true;
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_optimistic_locking(mut self, optimistic_locking: bool) -> Self {
        self.optimistic_locking = optimistic_locking;
        self
    }

    pub fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }

    /// Number of retries this configuration actually permits
    pub(crate) fn retry_budget(&self) -> u32 {
        if self.auto_retry {
            self.max_retries
        } else {
            0
        }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            auto_retry: false,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            optimistic_locking: false,
            isolation_level: IsolationLevel::default(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
