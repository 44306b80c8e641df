//! Lifecycle vocabulary shared by the actor, the health engine, the gate
//! and the status file.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of the managed backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
    Unhealthy,
}

impl Status {
    /// Upper-case status name as shown in JSON bodies and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Stopped => "STOPPED",
            Status::Starting => "STARTING",
            Status::Started => "STARTED",
            Status::Stopping => "STOPPING",
            Status::Unhealthy => "UNHEALTHY",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative lifecycle record.
///
/// This is both the reply body of a lifecycle request and the document
/// written to the status file. `stop_at` only carries meaning while the
/// status is `Started`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LifecycleSnapshot {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_stopped: Option<DateTime<Utc>>,
    #[serde(rename = "stop-due-at", default)]
    pub stop_at: DateTime<Utc>,
}

impl LifecycleSnapshot {
    /// Same snapshot with an error attached.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
