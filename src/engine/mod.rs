//! # 仿真引擎
//!
//! 单线程协作式步进：每个 tick 依次
//!
//! 1. 推进所有在途 token（[`Transit`]），落地到库所或迁移；
//! 2. 提交到期的两阶段激发（[`Firing`]）；
//! 3. 轮询初始化器生成新 token；
//! 4. 若开启自动运行且间隔已到，从可激发迁移中均匀随机选择一个激发。
//!
//! 网本身由调用方持有，引擎只保存在途与待提交的状态。

pub mod firing;
pub mod generator;
pub mod task;
pub mod transit;

use std::time::Duration;

use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::config::EngineConfig;
use crate::net::core::Net;
use crate::net::ids::{NodeRef, PlaceId, TransitionId};
use crate::net::structure::{PendingToken, SmartToken, Weight};

pub use firing::{Firing, FiringPhase, FiringProtocol};
pub use task::Decision;
pub use transit::{Transit, TransitState};

use task::{decide, order_values};

/// Result of an explicit fire request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// Inputs withdrawn and outputs sent (direct protocol).
    Fired,
    /// Inputs withdrawn, commit scheduled (two-phase protocol).
    Withdrawing,
    NotEnabled,
    /// A previous firing of the transition has not committed yet.
    Busy,
    Unknown,
}

impl FireOutcome {
    pub fn is_fired(self) -> bool {
        matches!(self, FireOutcome::Fired | FireOutcome::Withdrawing)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub landed: usize,
    pub committed: usize,
    pub refunded: usize,
    pub generated: usize,
    pub fired: Option<TransitionId>,
}

pub struct Simulator {
    config: EngineConfig,
    clock: Duration,
    epoch: Duration,
    transits: Vec<Transit>,
    firings: IndexMap<TransitionId, Firing>,
    running: bool,
    last_step: Duration,
    rng: StdRng,
}

impl Simulator {
    pub fn new(config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let running = config.autorun;
        Self {
            config,
            clock: Duration::ZERO,
            epoch: Duration::ZERO,
            transits: Vec::new(),
            firings: IndexMap::new(),
            running,
            last_step: Duration::ZERO,
            rng,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn transits(&self) -> &[Transit] {
        &self.transits
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn phase(&self, transition: TransitionId) -> FiringPhase {
        self.firings
            .get(&transition)
            .map_or(FiringPhase::Idle, |firing| firing.phase)
    }

    /// No transit in flight and no commit pending.
    pub fn is_quiescent(&self) -> bool {
        self.transits.is_empty() && self.firings.is_empty()
    }

    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() {
            self.config.speed = speed.max(0.0);
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last_step = self.clock;
    }

    /// Stops autorun and cancels every scheduled commit, refunding the
    /// withdrawn inputs. Returns the number of cancelled firings.
    pub fn stop(&mut self, net: &mut Net) -> usize {
        self.running = false;
        let cancelled = self.cancel_firings(net);
        if cancelled > 0 {
            log::debug!("stop cancelled {cancelled} pending commits");
        }
        cancelled
    }

    /// Drops all transient state and restores `M₀`.
    pub fn reset(&mut self, net: &mut Net) {
        self.transits.clear();
        self.firings.clear();
        net.reset_marking();
        self.epoch = self.clock;
        self.last_step = self.clock;
    }

    /// Fires `transition` with the configured protocol.
    pub fn fire(&mut self, net: &mut Net, transition: TransitionId) -> FireOutcome {
        let Some(t) = net.transition(transition) else {
            return FireOutcome::Unknown;
        };
        if t.is_active() || self.firings.contains_key(&transition) {
            return FireOutcome::Busy;
        }
        if !net.is_enabled(transition) {
            return FireOutcome::NotEnabled;
        }

        let withdrawn = withdraw(net, transition);
        match self.config.protocol {
            FiringProtocol::Direct => {
                if let Some(t) = net.transition_mut(transition) {
                    t.pending = withdrawn;
                }
                let sent = self.commit(net, transition);
                log::debug!("fired {transition} directly, {sent} output transits");
                FireOutcome::Fired
            }
            FiringProtocol::TwoPhase => {
                let mut firing = Firing::new(transition, self.clock + self.config.commit_delay());
                for pending in &withdrawn {
                    self.transits.push(
                        Transit::new(
                            NodeRef::Place(pending.source),
                            NodeRef::Transition(transition),
                            pending.token,
                        )
                        .with_units(pending.units),
                    );
                }
                firing.awaiting = withdrawn.len();
                firing.withdrawn = withdrawn;
                if let Some(t) = net.transition_mut(transition) {
                    t.active = true;
                    t.pending.clear();
                }
                log::debug!(
                    "withdrew {} inputs of {transition}, commit at {:?}",
                    firing.awaiting,
                    firing.commit_at
                );
                self.firings.insert(transition, firing);
                FireOutcome::Withdrawing
            }
        }
    }

    /// Fires one enabled, idle transition chosen uniformly at random.
    pub fn step(&mut self, net: &mut Net) -> Option<TransitionId> {
        let candidates: Vec<TransitionId> = net
            .enabled_transitions()
            .into_iter()
            .filter(|id| !self.firings.contains_key(id))
            .collect();
        let chosen = *candidates.choose(&mut self.rng)?;
        self.fire(net, chosen).is_fired().then_some(chosen)
    }

    pub fn tick(&mut self, net: &mut Net, elapsed: Duration) -> TickSummary {
        let mut summary = TickSummary::default();
        self.clock += elapsed;

        let step = self.config.progress_step();
        let mut finished = Vec::new();
        self.transits.retain_mut(|transit| {
            if transit.advance(step, elapsed) == TransitState::Finished {
                finished.push(transit.clone());
                false
            } else {
                true
            }
        });
        summary.landed = finished.len();
        for transit in finished {
            self.land(net, transit);
        }

        let due: Vec<TransitionId> = self
            .firings
            .values()
            .filter(|firing| firing.is_due(self.clock))
            .map(|firing| firing.transition)
            .collect();
        for transition in due {
            let Some(mut firing) = self.firings.shift_remove(&transition) else {
                continue;
            };
            firing.phase = FiringPhase::Committing;
            let still_wired = net
                .transition(transition)
                .is_some_and(|t| !t.inputs().is_empty());
            if still_wired {
                let sent = self.commit(net, transition);
                log::debug!("committed {transition}, {sent} output transits");
                summary.committed += 1;
            } else {
                log::warn!("{transition} lost its inputs before commit, refunding");
                refund(net, &firing.withdrawn);
                if let Some(t) = net.transition_mut(transition) {
                    t.clear_transient();
                }
                summary.refunded += 1;
            }
        }

        let generated = generator::poll(net, self.clock, self.epoch);
        summary.generated = generated.len();
        self.transits.extend(generated);

        if self.running && self.clock.saturating_sub(self.last_step) >= self.config.step_interval() {
            self.last_step = self.clock;
            summary.fired = self.step(net);
        }
        summary
    }

    /// Ticks with the configured tick length until nothing is in flight.
    /// Returns the number of ticks run.
    pub fn run_until_idle(&mut self, net: &mut Net, max_ticks: usize) -> usize {
        let tick = self.config.tick();
        let mut ticks = 0;
        while !self.is_quiescent() && ticks < max_ticks {
            self.tick(net, tick);
            ticks += 1;
        }
        ticks
    }

    /// Forgets state referring to nodes that no longer exist. Called after
    /// every edit.
    pub fn prune(&mut self, net: &mut Net) {
        let orphaned: Vec<TransitionId> = self
            .firings
            .keys()
            .filter(|id| net.transition(**id).is_none())
            .copied()
            .collect();
        for transition in orphaned {
            if let Some(firing) = self.firings.shift_remove(&transition) {
                refund(net, &firing.withdrawn);
            }
        }
        let firings = &self.firings;
        self.transits.retain(|transit| match transit.to.as_transition() {
            Some(id) => firings.contains_key(&id),
            None => net.contains(transit.to),
        });
    }

    fn cancel_firings(&mut self, net: &mut Net) -> usize {
        let cancelled = self.firings.len();
        for (transition, firing) in self.firings.drain(..) {
            refund(net, &firing.withdrawn);
            if let Some(t) = net.transition_mut(transition) {
                t.clear_transient();
            }
        }
        self.transits
            .retain(|transit| !matches!(transit.to, NodeRef::Transition(_)));
        cancelled
    }

    fn land(&mut self, net: &mut Net, transit: Transit) {
        log::trace!("transit {} -> {} landed", transit.from, transit.to);
        match transit.to {
            NodeRef::Place(place) => {
                if let Some(place) = net.place_mut(place) {
                    place.deposit(transit.units, transit.token);
                }
            }
            NodeRef::Transition(transition) => {
                let Some(firing) = self.firings.get_mut(&transition) else {
                    return;
                };
                firing.arrive();
                if let (Some(source), Some(t)) =
                    (transit.from.as_place(), net.transition_mut(transition))
                {
                    t.pending.push(PendingToken {
                        source,
                        units: transit.units,
                        token: transit.token,
                    });
                }
            }
            NodeRef::Initializer(_) => {}
        }
    }

    /// Produces the outputs of `transition` from its pending inputs and
    /// returns the number of transits sent.
    fn commit(&mut self, net: &mut Net, transition: TransitionId) -> usize {
        let mode = net.mode();
        let Some(t) = net.transition_mut(transition) else {
            return 0;
        };
        let pending = std::mem::take(&mut t.pending);
        t.active = false;
        let (task, routing, order) = (t.task, t.routing, t.token_order.clone());

        let outputs: Vec<(PlaceId, Weight)> = net
            .output_arcs(transition)
            .map(|(_, arc)| (arc.place(), arc.effective_weight(mode)))
            .collect();
        let from = NodeRef::Transition(transition);
        let before = self.transits.len();

        if mode.is_smart() {
            let values = order_values(&pending, order.as_ref());
            match decide(&task, routing, &values) {
                Decision::Emit { token, delay } => {
                    for (place, _) in outputs {
                        let transit = Transit::new(from, NodeRef::Place(place), Some(token));
                        self.transits
                            .push(transit.with_delay(delay.unwrap_or_default()));
                    }
                }
                Decision::Suppress => {
                    log::debug!("{transition} ({task}) suppressed output for {values:?}");
                }
                Decision::Failed => {
                    log::debug!("{transition} ({task}) failed on {values:?}");
                }
            }
        } else {
            for (place, weight) in outputs {
                for _ in 0..weight {
                    self.transits
                        .push(Transit::new(from, NodeRef::Place(place), None));
                }
            }
        }
        self.transits.len() - before
    }
}

/// Removes the effective arc weight from every input place.
fn withdraw(net: &mut Net, transition: TransitionId) -> Vec<PendingToken> {
    let mode = net.mode();
    let inputs: Vec<(PlaceId, Weight)> = net
        .input_arcs(transition)
        .map(|(_, arc)| (arc.place(), arc.effective_weight(mode)))
        .collect();
    let mut withdrawn = Vec::with_capacity(inputs.len());
    for (source, units) in inputs {
        let Some(place) = net.place_mut(source) else {
            continue;
        };
        let token = mode
            .is_smart()
            .then(|| SmartToken::new(place.value().unwrap_or(0.0)));
        if place.remove_tokens(units) {
            withdrawn.push(PendingToken {
                source,
                units,
                token,
            });
        }
    }
    withdrawn
}

fn refund(net: &mut Net, withdrawn: &[PendingToken]) {
    for pending in withdrawn {
        if let Some(place) = net.place_mut(pending.source) {
            place.deposit(pending.units, pending.token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Initializer, NetMode, Place, Routing, Transition};
    use crate::net::task::Task;

    fn seeded(protocol: FiringProtocol) -> Simulator {
        Simulator::new(EngineConfig {
            protocol,
            seed: Some(42),
            ..EngineConfig::default()
        })
    }

    /// p0 --2--> t0 --3--> p1
    fn weighted() -> (Net, PlaceId, TransitionId, PlaceId) {
        let mut net = Net::empty();
        let p0 = net.add_place(Place::with_tokens("p0", 2)).unwrap();
        let p1 = net.add_place(Place::new("p1")).unwrap();
        let t0 = net.add_transition(Transition::new("t0")).unwrap();
        net.add_arc(p0, t0, 2).unwrap();
        net.add_arc(t0, p1, 3).unwrap();
        (net, p0, t0, p1)
    }

    #[test]
    fn two_phase_moves_exact_weights() {
        let (mut net, p0, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::TwoPhase);

        assert_eq!(sim.fire(&mut net, t0), FireOutcome::Withdrawing);
        assert_eq!(net.place(p0).unwrap().tokens(), 0);
        assert_eq!(sim.phase(t0), FiringPhase::Withdrawing);
        assert!(net.transition(t0).unwrap().is_active());
        assert_eq!(sim.fire(&mut net, t0), FireOutcome::Busy);

        sim.run_until_idle(&mut net, 1000);
        assert!(sim.is_quiescent());
        assert_eq!(net.place(p0).unwrap().tokens(), 0);
        assert_eq!(net.place(p1).unwrap().tokens(), 3);
        assert_eq!(sim.phase(t0), FiringPhase::Idle);
        assert!(!net.transition(t0).unwrap().is_active());
    }

    #[test]
    fn direct_fire_sends_outputs_immediately() {
        let (mut net, p0, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::Direct);

        assert_eq!(sim.fire(&mut net, t0), FireOutcome::Fired);
        assert_eq!(sim.transits().len(), 3);
        assert_eq!(sim.fire(&mut net, t0), FireOutcome::NotEnabled);
        sim.run_until_idle(&mut net, 1000);
        assert_eq!(net.marking().tokens(p0), 0);
        assert_eq!(net.marking().tokens(p1), 3);
    }

    #[test]
    fn unknown_and_disabled_requests_are_noops() {
        let (mut net, p0, t0, _) = weighted();
        let mut sim = seeded(FiringProtocol::TwoPhase);
        net.place_mut(p0).unwrap().remove_tokens(1);
        let before = net.marking();
        assert_eq!(sim.fire(&mut net, t0), FireOutcome::NotEnabled);
        assert_eq!(sim.fire(&mut net, TransitionId::new(99)), FireOutcome::Unknown);
        assert_eq!(net.marking(), before);
        assert_eq!(sim.step(&mut net), None);
    }

    #[test]
    fn stop_refunds_withdrawn_inputs() {
        let (mut net, p0, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::TwoPhase);
        sim.fire(&mut net, t0);
        sim.tick(&mut net, Duration::from_millis(50));

        assert_eq!(sim.stop(&mut net), 1);
        assert!(sim.is_quiescent());
        assert_eq!(net.place(p0).unwrap().tokens(), 2);
        assert_eq!(net.place(p1).unwrap().tokens(), 0);
        assert!(!net.transition(t0).unwrap().is_active());
    }

    #[test]
    fn commit_refunds_when_inputs_vanish() {
        let (mut net, p0, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::TwoPhase);
        sim.fire(&mut net, t0);

        let input = net.input_arcs(t0).map(|(id, _)| id).next().unwrap();
        net.remove_arc(input).unwrap();
        sim.prune(&mut net);
        sim.run_until_idle(&mut net, 1000);

        assert_eq!(net.place(p0).unwrap().tokens(), 2);
        assert_eq!(net.place(p1).unwrap().tokens(), 0);
    }

    #[test]
    fn reset_restores_initial_marking() {
        let (mut net, p0, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::Direct);
        sim.fire(&mut net, t0);
        sim.run_until_idle(&mut net, 1000);
        sim.reset(&mut net);
        assert!(sim.is_quiescent());
        assert_eq!(net.marking().tokens(p0), 2);
        assert_eq!(net.marking().tokens(p1), 0);
    }

    #[test]
    fn autorun_fires_the_only_enabled_transition() {
        let (mut net, _, t0, p1) = weighted();
        let mut sim = seeded(FiringProtocol::TwoPhase);
        sim.start();
        let mut fired = Vec::new();
        for _ in 0..100 {
            if let Some(t) = sim.tick(&mut net, Duration::from_millis(50)).fired {
                fired.push(t);
            }
        }
        assert_eq!(fired, vec![t0]);
        assert_eq!(net.marking().tokens(p1), 3);
    }

    fn comparator(input: f64) -> (Net, TransitionId, PlaceId, PlaceId) {
        let mut net = Net::new(NetMode::Smart);
        let p = net
            .add_place(Place::with_tokens("in", 1).with_value(input))
            .unwrap();
        let a = net.add_place(Place::new("a")).unwrap();
        let b = net.add_place(Place::new("b")).unwrap();
        let t = net
            .add_transition(
                Transition::new("eq")
                    .with_task(Task::Equals(5.0))
                    .with_routing(Routing::PASS_ON_TRUE),
            )
            .unwrap();
        net.add_arc(p, t, 1).unwrap();
        net.add_arc(t, a, 1).unwrap();
        net.add_arc(t, b, 1).unwrap();
        (net, t, a, b)
    }

    #[test]
    fn equality_emits_on_every_output() {
        let (mut net, t, a, b) = comparator(5.0);
        let mut sim = seeded(FiringProtocol::TwoPhase);
        sim.fire(&mut net, t);
        sim.run_until_idle(&mut net, 1000);
        for place in [a, b] {
            let place = net.place(place).unwrap();
            assert_eq!(place.tokens(), 1);
            assert_eq!(place.value(), Some(1.0));
        }
    }

    #[test]
    fn equality_suppresses_on_mismatch() {
        let (mut net, t, a, b) = comparator(3.0);
        let mut sim = seeded(FiringProtocol::TwoPhase);
        sim.fire(&mut net, t);
        sim.run_until_idle(&mut net, 1000);
        assert_eq!(net.marking().tokens(a), 0);
        assert_eq!(net.marking().tokens(b), 0);
    }

    #[test]
    fn ordered_subtraction() {
        let mut net = Net::new(NetMode::Smart);
        let a = net.add_place(Place::with_tokens("A", 1).with_value(3.0)).unwrap();
        let b = net.add_place(Place::with_tokens("B", 1).with_value(10.0)).unwrap();
        let out = net.add_place(Place::new("out")).unwrap();
        let t = net
            .add_transition(Transition::new("sub").with_task(Task::Subtract))
            .unwrap();
        net.add_arc(a, t, 1).unwrap();
        net.add_arc(b, t, 1).unwrap();
        net.add_arc(t, out, 1).unwrap();
        net.set_token_order(t, "B,A").unwrap();

        let mut sim = seeded(FiringProtocol::Direct);
        sim.fire(&mut net, t);
        sim.run_until_idle(&mut net, 1000);
        assert_eq!(net.place(out).unwrap().value(), Some(7.0));
    }

    #[test]
    fn delay_task_postpones_delivery() {
        let mut net = Net::new(NetMode::Smart);
        let src = net.add_place(Place::with_tokens("src", 1).with_value(2.0)).unwrap();
        let dst = net.add_place(Place::new("dst")).unwrap();
        let t = net
            .add_transition(
                Transition::new("wait").with_task(Task::Delay(Duration::from_secs(2))),
            )
            .unwrap();
        net.add_arc(src, t, 1).unwrap();
        net.add_arc(t, dst, 1).unwrap();

        let mut sim = seeded(FiringProtocol::Direct);
        sim.fire(&mut net, t);
        for _ in 0..30 {
            sim.tick(&mut net, Duration::from_millis(50));
        }
        assert_eq!(net.marking().tokens(dst), 0);
        let ticks = sim.run_until_idle(&mut net, 1000);
        assert!(ticks > 0);
        assert_eq!(net.place(dst).unwrap().value(), Some(2.0));
    }

    #[test]
    fn initializer_tokens_land_in_place() {
        let mut net = Net::empty();
        let p = net.add_place(Place::new("P")).unwrap();
        let i = net.add_initializer(Initializer::new("I", 2, 20.0)).unwrap();
        net.add_arc(i, p, 1).unwrap();

        let mut sim = seeded(FiringProtocol::TwoPhase);
        let mut generated = 0;
        for _ in 0..100 {
            generated += sim.tick(&mut net, Duration::from_millis(50)).generated;
        }
        assert_eq!(generated, 2);
        assert_eq!(net.marking().tokens(p), 2);
    }
}
