//! 迁移激发协议：`Idle → Withdrawing → Committing → Idle`。
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::ids::TransitionId;
use crate::net::structure::PendingToken;

/// How a fire request moves tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiringProtocol {
    /// Withdraw and commit in the same call.
    Direct,
    /// Withdraw now, commit once the input transits arrived and the commit
    /// delay elapsed.
    #[default]
    TwoPhase,
}

impl fmt::Display for FiringProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiringProtocol::Direct => write!(f, "direct"),
            FiringProtocol::TwoPhase => write!(f, "two-phase"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiringPhase {
    Idle,
    Withdrawing,
    Committing,
}

/// One in-flight firing of a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Firing {
    pub transition: TransitionId,
    pub phase: FiringPhase,
    /// Input transits still travelling toward the transition.
    pub awaiting: usize,
    /// Simulation time at which the commit may run.
    pub commit_at: Duration,
    /// Tokens removed from the input places, for refunds.
    pub withdrawn: Vec<PendingToken>,
}

impl Firing {
    pub fn new(transition: TransitionId, commit_at: Duration) -> Self {
        Self {
            transition,
            phase: FiringPhase::Withdrawing,
            awaiting: 0,
            commit_at,
            withdrawn: Vec::new(),
        }
    }

    pub fn arrive(&mut self) {
        self.awaiting = self.awaiting.saturating_sub(1);
    }

    /// All inputs arrived and the delay elapsed.
    pub fn is_due(&self, now: Duration) -> bool {
        self.phase == FiringPhase::Withdrawing && self.awaiting == 0 && now >= self.commit_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_after_arrivals_and_delay() {
        let mut firing = Firing::new(TransitionId::new(3), Duration::from_millis(500));
        firing.awaiting = 2;
        firing.arrive();
        assert!(!firing.is_due(Duration::from_secs(1)));
        firing.arrive();
        assert!(!firing.is_due(Duration::from_millis(499)));
        assert!(firing.is_due(Duration::from_millis(500)));
    }

    #[test]
    fn protocol_names() {
        assert_eq!(FiringProtocol::default(), FiringProtocol::TwoPhase);
        assert_eq!(FiringProtocol::Direct.to_string(), "direct");
        let parsed: FiringProtocol = serde_json::from_str("\"two-phase\"").unwrap();
        assert_eq!(parsed, FiringProtocol::TwoPhase);
    }
}
