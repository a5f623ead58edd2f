use std::time::Duration;

use crate::net::ids::NodeRef;
use crate::net::structure::{SmartToken, Weight};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitState {
    /// Waiting for its start delay (`p` task) to run out.
    Delayed,
    InProgress,
    Finished,
}

/// 在途 token：从一个节点流向另一个节点，进度从 0 推进到 1。
#[derive(Debug, Clone, PartialEq)]
pub struct Transit {
    pub from: NodeRef,
    pub to: NodeRef,
    pub token: Option<SmartToken>,
    pub units: Weight,
    progress: f64,
    delay: Duration,
}

impl Transit {
    pub fn new(from: NodeRef, to: NodeRef, token: Option<SmartToken>) -> Self {
        Self {
            from,
            to,
            token,
            units: 1,
            progress: 0.0,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_units(mut self, units: Weight) -> Self {
        self.units = units;
        self
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn state(&self) -> TransitState {
        if !self.delay.is_zero() {
            TransitState::Delayed
        } else if self.progress >= 1.0 {
            TransitState::Finished
        } else {
            TransitState::InProgress
        }
    }

    /// Runs one tick. The start delay consumes `elapsed` first; travel only
    /// begins on the tick after it ran out. Progress is clamped at 1.
    pub fn advance(&mut self, step: f64, elapsed: Duration) -> TransitState {
        if !self.delay.is_zero() {
            self.delay = self.delay.saturating_sub(elapsed);
            return self.state();
        }
        self.progress = (self.progress + step.max(0.0)).min(1.0);
        self.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ids::{PlaceId, TransitionId};

    fn transit() -> Transit {
        Transit::new(
            NodeRef::Transition(TransitionId::new(0)),
            NodeRef::Place(PlaceId::new(1)),
            None,
        )
    }

    #[test]
    fn progress_is_clamped() {
        let mut transit = transit();
        assert_eq!(transit.advance(0.6, Duration::ZERO), TransitState::InProgress);
        assert_eq!(transit.advance(0.6, Duration::ZERO), TransitState::Finished);
        assert_eq!(transit.progress(), 1.0);
    }

    #[test]
    fn delay_holds_travel_back() {
        let mut transit = transit().with_delay(Duration::from_millis(100));
        assert_eq!(transit.state(), TransitState::Delayed);
        assert_eq!(transit.advance(1.0, Duration::from_millis(60)), TransitState::Delayed);
        assert_eq!(transit.advance(1.0, Duration::from_millis(60)), TransitState::InProgress);
        assert_eq!(transit.progress(), 0.0);
        assert_eq!(transit.advance(1.0, Duration::from_millis(60)), TransitState::Finished);
    }
}
