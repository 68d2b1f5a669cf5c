use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::MonitorStatus;

/// Category of a status change between two consecutive observations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    None,
    /// First known status of a target that came up healthy.
    FirstObservation,
    Recovered,
    Degraded,
}

impl TransitionKind {
    /// Only real availability changes reach users.
    pub fn should_notify(self) -> bool {
        matches!(self, TransitionKind::Recovered | TransitionKind::Degraded)
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransitionKind::None => "none",
            TransitionKind::FirstObservation => "first_observation",
            TransitionKind::Recovered => "recovered",
            TransitionKind::Degraded => "degraded",
        })
    }
}

/// Classify the move from `previous` to `current`.
///
/// A target that is down on its very first probe is reported as degraded.
pub fn classify(previous: MonitorStatus, current: MonitorStatus) -> TransitionKind {
    match (previous, current) {
        (MonitorStatus::Unknown, MonitorStatus::Up) => TransitionKind::FirstObservation,
        (MonitorStatus::Down, MonitorStatus::Up) => TransitionKind::Recovered,
        (MonitorStatus::Unknown | MonitorStatus::Up, MonitorStatus::Down) => TransitionKind::Degraded,
        // unchanged, or a regression to unknown
        _ => TransitionKind::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::MonitorStatus::{Down, Unknown, Up};

    #[test]
    fn classifies_every_pair() {
        assert_eq!(classify(Unknown, Unknown), TransitionKind::None);
        assert_eq!(classify(Up, Up), TransitionKind::None);
        assert_eq!(classify(Down, Down), TransitionKind::None);
        assert_eq!(classify(Unknown, Up), TransitionKind::FirstObservation);
        assert_eq!(classify(Unknown, Down), TransitionKind::Degraded);
        assert_eq!(classify(Up, Down), TransitionKind::Degraded);
        assert_eq!(classify(Down, Up), TransitionKind::Recovered);
    }

    #[test]
    fn flapping_sequence_notifies_once_per_edge() {
        let observed = [Up, Down, Down, Down, Up];
        let mut previous = Unknown;
        let mut notified = Vec::new();

        for status in observed {
            let kind = classify(previous, status);
            if kind.should_notify() {
                notified.push(kind);
            }
            previous = status;
        }

        assert_eq!(notified, vec![TransitionKind::Degraded, TransitionKind::Recovered]);
    }

    #[test]
    fn first_observation_is_silent() {
        assert!(!TransitionKind::FirstObservation.should_notify());
        assert!(!TransitionKind::None.should_notify());
    }
}
