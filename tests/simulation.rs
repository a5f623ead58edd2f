use std::time::Duration;

use smart_petri::config::EngineConfig;
use smart_petri::engine::{FireOutcome, FiringProtocol, Simulator};
use smart_petri::net::{
    Initializer, Net, NetMode, NodeRef, Place, Position, Routing, Task, Transition, io,
};
use smart_petri::report::AnalysisReport;
use smart_petri::session::Session;

/// Smart model: a source feeds `x`, `x` and `y` are summed into `sum`,
/// and `sum` is checked against 12.
fn adder() -> Net {
    let mut net = Net::new(NetMode::Smart);
    let x = net
        .add_place(Place::new("x").at(Position::new(10.0, 20.0)))
        .unwrap();
    let y = net
        .add_place(Place::with_tokens("y", 1).with_value(7.0))
        .unwrap();
    let sum = net.add_place(Place::new("sum")).unwrap();
    let hit = net.add_place(Place::new("hit")).unwrap();
    let add = net
        .add_transition(Transition::new("add").with_task(Task::Add))
        .unwrap();
    let check = net
        .add_transition(
            Transition::new("check")
                .with_task(Task::Equals(12.0))
                .with_routing(Routing::PASS_ON_TRUE | Routing::PASS_PREVIOUS_VALUE),
        )
        .unwrap();
    let source = net
        .add_initializer(Initializer::new("source", 1, 4.0).with_value(5.0))
        .unwrap();
    net.add_arc(source, x, 1).unwrap();
    net.add_arc(x, add, 1).unwrap();
    net.add_arc(y, add, 1).unwrap();
    net.add_arc(add, sum, 1).unwrap();
    net.add_arc(sum, check, 1).unwrap();
    net.add_arc(check, hit, 1).unwrap();
    net.set_token_order(add, "y,x").unwrap();
    net
}

#[test]
fn snapshot_round_trip_through_files() {
    let net = adder();
    let dir = std::env::temp_dir().join(format!("smart-petri-it-{}", std::process::id()));

    for file in ["net.json", "net.ron"] {
        let path = dir.join(file);
        io::save_net(&net, &path).unwrap();
        let loaded = io::load_net(&path).unwrap();
        assert_eq!(loaded.to_snapshot(), net.to_snapshot());
        assert_eq!(loaded.mode(), NetMode::Smart);

        let add = loaded.find_transition("add").unwrap();
        assert_eq!(loaded.token_order_spec(add).as_deref(), Some("y,x"));
        let x = loaded.find_place("x").unwrap();
        assert_eq!(loaded.place(x).unwrap().position, Position::new(10.0, 20.0));
    }
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn smart_pipeline_runs_to_completion() {
    let config = EngineConfig {
        seed: Some(3),
        autorun: true,
        step_interval_ms: 100,
        ..EngineConfig::default()
    };
    let mut session = Session::new(adder(), config);
    for _ in 0..400 {
        session.tick();
    }
    let net = session.net();
    let hit = net.place(net.find_place("hit").unwrap()).unwrap();
    assert_eq!(hit.tokens(), 1);
    assert_eq!(hit.value(), Some(12.0));
    assert_eq!(net.marking().tokens(net.find_place("y").unwrap()), 0);

    session.reset();
    let net = session.net();
    assert_eq!(net.marking().tokens(net.find_place("y").unwrap()), 1);
    assert_eq!(net.marking().tokens(net.find_place("hit").unwrap()), 0);
}

#[test]
fn two_phase_conserves_weighted_flow() {
    // p0(4) --2--> t --1--> p1, t --3--> p2
    let mut net = Net::empty();
    let p0 = net.add_place(Place::with_tokens("p0", 4)).unwrap();
    let p1 = net.add_place(Place::new("p1")).unwrap();
    let p2 = net.add_place(Place::new("p2")).unwrap();
    let t = net.add_transition(Transition::new("t")).unwrap();
    net.add_arc(p0, t, 2).unwrap();
    net.add_arc(t, p1, 1).unwrap();
    net.add_arc(t, p2, 3).unwrap();

    let mut sim = Simulator::new(EngineConfig {
        protocol: FiringProtocol::TwoPhase,
        seed: Some(11),
        ..EngineConfig::default()
    });
    for round in 1..=2u64 {
        assert_eq!(sim.fire(&mut net, t), FireOutcome::Withdrawing);
        sim.run_until_idle(&mut net, 10_000);
        let marking = net.marking();
        assert_eq!(marking.tokens(p0), 4 - 2 * round);
        assert_eq!(marking.tokens(p1), round);
        assert_eq!(marking.tokens(p2), 3 * round);
    }
    assert_eq!(sim.fire(&mut net, t), FireOutcome::NotEnabled);
    assert!(sim.clock() > Duration::ZERO);
}

#[test]
fn analysis_is_stable_across_runs() {
    let net = adder();
    let first = AnalysisReport::build(&net);
    let second = AnalysisReport::build(&net);
    assert_eq!(first.subnets.len(), 1);
    let notation = |report: &AnalysisReport| {
        report
            .subnets
            .iter()
            .map(|s| s.notation.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(notation(&first), notation(&second));
    assert!(first.subnets[0].notation.contains("I(x, add) = 1"));
}

#[test]
fn edits_keep_references_consistent() {
    let mut session = Session::new(adder(), EngineConfig::default());
    let x = session.net().find_place("x").unwrap();
    session
        .edit(|net| net.rename(NodeRef::Place(x), "input"))
        .unwrap();
    let add = session.net().find_transition("add").unwrap();
    assert_eq!(session.net().token_order_spec(add).as_deref(), Some("y,input"));

    session.edit(|net| net.remove_node(NodeRef::Place(x))).unwrap();
    assert_eq!(session.net().token_order_spec(add).as_deref(), Some("y"));
    let source = session.net().find_initializer("source").unwrap();
    assert_eq!(session.net().initializer(source).unwrap().output(), None);
}
