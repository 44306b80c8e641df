//! Per-pass tally of raw instance states and its resolution into a status.

use std::collections::BTreeMap;
use std::fmt;

use flywheel_compute::InstanceState;
use flywheel_core::Status;

/// Why a pass resolved to `Unhealthy`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnhealthyCause {
    /// Some resources are starting while others are stopping.
    MixedDirection,
    /// Some resources are running while others are stopped.
    MixedRunningStopped,
    /// An instance was destroyed. Never recovered automatically.
    Terminated,
    /// Nothing recognizable was observed.
    Unrecognized,
    /// A provider query failed; the pass was abandoned.
    ObservationFailed(String),
}

impl UnhealthyCause {
    pub fn requires_intervention(&self) -> bool {
        matches!(self, UnhealthyCause::Terminated)
    }
}

impl fmt::Display for UnhealthyCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnhealthyCause::MixedDirection => f.write_str("mix of starting and stopping resources"),
            UnhealthyCause::MixedRunningStopped => {
                f.write_str("mix of running and stopped resources")
            }
            UnhealthyCause::Terminated => {
                f.write_str("instance terminated, manual intervention required")
            }
            UnhealthyCause::Unrecognized => f.write_str("no recognized instance state"),
            UnhealthyCause::ObservationFailed(e) => write!(f, "observation failed: {e}"),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub status: Status,
    /// Set exactly when `status` is `Unhealthy`.
    pub cause: Option<UnhealthyCause>,
}

impl Resolution {
    fn status(status: Status) -> Self {
        Self {
            status,
            cause: None,
        }
    }

    pub fn unhealthy(cause: UnhealthyCause) -> Self {
        Self {
            status: Status::Unhealthy,
            cause: Some(cause),
        }
    }
}

/// Count of instances per raw lifecycle label, built fresh for every pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthTally {
    counts: BTreeMap<InstanceState, u32>,
}

impl HealthTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, state: InstanceState) {
        *self.counts.entry(state).or_insert(0) += 1;
    }

    pub fn count(&self, state: &InstanceState) -> u32 {
        self.counts.get(state).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    fn has(&self, state: &InstanceState) -> bool {
        self.count(state) > 0
    }

    pub fn resolve(&self) -> Resolution {
        let pending = self.has(&InstanceState::Pending);
        let stopping =
            self.has(&InstanceState::Stopping) || self.has(&InstanceState::ShuttingDown);
        let running = self.has(&InstanceState::Running);
        let stopped = self.has(&InstanceState::Stopped);
        let terminated = self.has(&InstanceState::Terminated);

        if pending && stopping {
            Resolution::unhealthy(UnhealthyCause::MixedDirection)
        } else if running && stopped {
            Resolution::unhealthy(UnhealthyCause::MixedRunningStopped)
        } else if terminated {
            Resolution::unhealthy(UnhealthyCause::Terminated)
        } else if pending {
            Resolution::status(Status::Starting)
        } else if stopping {
            Resolution::status(Status::Stopping)
        } else if running {
            Resolution::status(Status::Started)
        } else if stopped {
            Resolution::status(Status::Stopped)
        } else {
            Resolution::unhealthy(UnhealthyCause::Unrecognized)
        }
    }
}

impl fmt::Display for HealthTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return f.write_str("{}");
        }
        let parts: Vec<String> = self
            .counts
            .iter()
            .map(|(state, n)| format!("{state}:{n}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(entries: &[(&str, u32)]) -> HealthTally {
        let mut tally = HealthTally::new();
        for (label, n) in entries {
            for _ in 0..*n {
                tally.record(InstanceState::from_label(label));
            }
        }
        tally
    }

    #[test]
    fn all_running_is_started() {
        assert_eq!(tally(&[("running", 3)]).resolve().status, Status::Started);
    }

    #[test]
    fn all_stopped_is_stopped() {
        assert_eq!(tally(&[("stopped", 3)]).resolve().status, Status::Stopped);
    }

    #[test]
    fn pending_with_running_is_starting() {
        let resolution = tally(&[("pending", 1), ("running", 2)]).resolve();
        assert_eq!(resolution.status, Status::Starting);
        assert!(resolution.cause.is_none());
    }

    #[test]
    fn stopping_and_shutting_down_are_stopping() {
        assert_eq!(tally(&[("stopping", 1), ("stopped", 1)]).resolve().status, Status::Stopping);
        assert_eq!(tally(&[("shutting-down", 2)]).resolve().status, Status::Stopping);
    }

    #[test]
    fn running_with_stopped_is_unhealthy() {
        let resolution = tally(&[("running", 1), ("stopped", 1)]).resolve();
        assert_eq!(resolution.status, Status::Unhealthy);
        assert_eq!(resolution.cause, Some(UnhealthyCause::MixedRunningStopped));
    }

    #[test]
    fn pending_with_stopping_is_unhealthy() {
        let resolution = tally(&[("pending", 1), ("shutting-down", 1)]).resolve();
        assert_eq!(resolution.cause, Some(UnhealthyCause::MixedDirection));
    }

    #[test]
    fn terminated_requires_intervention() {
        let resolution = tally(&[("terminated", 1)]).resolve();
        assert_eq!(resolution.status, Status::Unhealthy);
        assert!(resolution.cause.unwrap().requires_intervention());
    }

    #[test]
    fn terminated_outranks_pending() {
        let resolution = tally(&[("terminated", 1), ("pending", 1)]).resolve();
        assert_eq!(resolution.cause, Some(UnhealthyCause::Terminated));
    }

    #[test]
    fn empty_or_unknown_is_unhealthy() {
        assert_eq!(HealthTally::new().resolve().status, Status::Unhealthy);
        let resolution = tally(&[("rebooting", 2)]).resolve();
        assert_eq!(resolution.cause, Some(UnhealthyCause::Unrecognized));
    }

    #[test]
    fn display_lists_counts() {
        assert_eq!(tally(&[("running", 2), ("pending", 1)]).to_string(), "{pending:1, running:2}");
        assert_eq!(HealthTally::new().to_string(), "{}");
    }
}
