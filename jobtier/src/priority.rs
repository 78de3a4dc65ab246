use std::fmt::Display;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ParsePriorityError;

/// Priority tiers, served in rank order.
///
/// The set is closed: adding a tier means redefining the enum, not
/// registering one at runtime. Target latencies are informational and feed
/// alerting; the queue never enforces them.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum JobPriority {
    /// Payment webhooks, order confirmations.
    Critical = 0,
    /// Notifications, inventory updates.
    High = 1,
    /// Report generation, email processing.
    Default = 2,
    /// Analytics aggregation, cache warming.
    Low = 3,
    /// Archive operations, data migrations.
    Bulk = 4,
}

impl JobPriority {
    /// All priorities in rank order (highest first).
    pub const ALL: [JobPriority; 5] = [
        JobPriority::Critical,
        JobPriority::High,
        JobPriority::Default,
        JobPriority::Low,
        JobPriority::Bulk,
    ];

    /// Numeric rank; lower is served first.
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Index into per-priority arrays.
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Target latency, or `None` for best-effort tiers.
    pub fn target_latency(self) -> Option<Duration> {
        match self {
            JobPriority::Critical => Some(Duration::seconds(1)),
            JobPriority::High => Some(Duration::seconds(5)),
            JobPriority::Default => Some(Duration::seconds(30)),
            JobPriority::Low => Some(Duration::minutes(2)),
            JobPriority::Bulk => None,
        }
    }

    /// Lowercase label used for metrics and serialized config.
    pub const fn as_str(self) -> &'static str {
        match self {
            JobPriority::Critical => "critical",
            JobPriority::High => "high",
            JobPriority::Default => "default",
            JobPriority::Low => "low",
            JobPriority::Bulk => "bulk",
        }
    }
}

impl Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobPriority::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}
