//! 编辑器控制接口：持有网与仿真器，串行化所有修改。
use crate::config::EngineConfig;
use crate::engine::{FireOutcome, Simulator, TickSummary};
use crate::net::core::{Net, NetError};
use crate::net::ids::TransitionId;
use crate::net::snapshot::NetSnapshot;
use crate::report::AnalysisReport;

pub struct Session {
    net: Net,
    simulator: Simulator,
}

impl Session {
    pub fn new(net: Net, config: EngineConfig) -> Self {
        Self {
            net,
            simulator: Simulator::new(config),
        }
    }

    pub fn net(&self) -> &Net {
        &self.net
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn start(&mut self) {
        log::info!("autorun started");
        self.simulator.start();
    }

    pub fn stop(&mut self) {
        let cancelled = self.simulator.stop(&mut self.net);
        log::info!("autorun stopped, {cancelled} pending commits cancelled");
    }

    pub fn step(&mut self) -> Option<TransitionId> {
        self.simulator.step(&mut self.net)
    }

    pub fn fire(&mut self, transition: TransitionId) -> FireOutcome {
        self.simulator.fire(&mut self.net, transition)
    }

    pub fn reset(&mut self) {
        log::info!("marking reset");
        self.simulator.reset(&mut self.net);
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.simulator.set_speed(speed);
    }

    /// Switches between T-model and S-model. In-flight state is dropped
    /// since it was produced under the other semantics.
    pub fn toggle_mode(&mut self) {
        let mode = self.net.mode().toggled();
        self.simulator.stop(&mut self.net);
        self.simulator.reset(&mut self.net);
        self.net.set_mode(mode);
    }

    pub fn tick(&mut self) -> TickSummary {
        let tick = self.simulator.config().tick();
        self.simulator.tick(&mut self.net, tick)
    }

    /// Applies an edit, then drops engine state pointing at removed nodes
    /// and re-validates arc references.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut Net) -> Result<T, NetError>) -> Result<T, NetError> {
        let result = f(&mut self.net);
        self.simulator.prune(&mut self.net);
        self.net.validate()?;
        result
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport::build(&self.net)
    }

    pub fn snapshot(&self) -> NetSnapshot {
        self.net.to_snapshot()
    }

    pub fn into_net(self) -> Net {
        self.net
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FiringProtocol;
    use crate::net::ids::NodeRef;
    use crate::net::structure::{NetMode, Place, Transition};

    fn session() -> (Session, TransitionId) {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::with_tokens("p0", 1)).unwrap();
        let p1 = net.add_place(Place::new("p1")).unwrap();
        let t0 = net.add_transition(Transition::new("t0")).unwrap();
        net.add_arc(p0, t0, 1).unwrap();
        net.add_arc(t0, p1, 1).unwrap();
        let config = EngineConfig {
            protocol: FiringProtocol::TwoPhase,
            seed: Some(1),
            ..EngineConfig::default()
        };
        (Session::new(net, config), t0)
    }

    #[test]
    fn removing_a_firing_transition_refunds_inputs() {
        let (mut session, t0) = session();
        assert_eq!(session.step(), Some(t0));
        session.tick();
        session
            .edit(|net| net.remove_node(NodeRef::Transition(t0)))
            .unwrap();
        let p0 = session.net().find_place("p0").unwrap();
        assert_eq!(session.net().marking().tokens(p0), 1);
        assert!(session.simulator().is_quiescent());
    }

    #[test]
    fn failed_edit_is_reported() {
        let (mut session, _) = session();
        let err = session
            .edit(|net| net.add_place(Place::new("p0")))
            .unwrap_err();
        assert!(matches!(err, NetError::DuplicateName { .. }));
    }

    #[test]
    fn toggle_mode_resets_marking() {
        let (mut session, t0) = session();
        session.fire(t0);
        session.toggle_mode();
        assert_eq!(session.net().mode(), NetMode::Smart);
        assert!(session.simulator().is_quiescent());
        let p0 = session.net().find_place("p0").unwrap();
        assert_eq!(session.net().marking().tokens(p0), 1);
    }
}
