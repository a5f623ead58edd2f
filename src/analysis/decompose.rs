//! 子网分解
//!
//! 以库所为起点做广度优先遍历：经由弧到达的迁移会把它的全部输入、输出库所
//! 一并纳入当前子网。优先从初始化器供给的库所出发，其余未访问的库所和迁移
//! 依次作为新的起点，没有输出库所的初始化器各自成为子网，最终得到全部极大连通子网。

use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};

use crate::net::core::Net;
use crate::net::ids::{ArcId, InitializerId, PlaceId, TransitionId};
use crate::net::structure::{ArcKind, Weight};

/// 一个极大连通子网，以及按 `(库所, 迁移)` 记录的输入/输出函数。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subnet {
    pub places: Vec<PlaceId>,
    pub transitions: Vec<TransitionId>,
    pub initializers: Vec<InitializerId>,
    pub arcs: Vec<ArcId>,
    /// `I(p, t)`
    pub input: IndexMap<(PlaceId, TransitionId), Weight>,
    /// `O(p, t)`
    pub output: IndexMap<(PlaceId, TransitionId), Weight>,
}

impl Subnet {
    pub fn is_empty(&self) -> bool {
        self.places.is_empty() && self.transitions.is_empty()
    }

    /// The whole net as one subnet.
    pub fn whole(net: &Net) -> Self {
        let mut subnet = Subnet {
            places: net.places().map(|(id, _)| id).collect(),
            transitions: net.transitions().map(|(id, _)| id).collect(),
            initializers: net.initializers().map(|(id, _)| id).collect(),
            ..Default::default()
        };
        for (id, arc) in net.arcs() {
            subnet.record(id, arc.kind, arc.weight());
        }
        subnet
    }

    fn record(&mut self, id: ArcId, kind: ArcKind, weight: Weight) {
        self.arcs.push(id);
        match kind {
            ArcKind::Input { place, transition } => {
                self.input.insert((place, transition), weight);
            }
            ArcKind::Output { transition, place } => {
                self.output.insert((place, transition), weight);
            }
            ArcKind::Source { .. } => {}
        }
    }
}

/// Partitions the net into its connected subnets. An empty net yields one
/// empty subnet.
pub fn decompose(net: &Net) -> Vec<Subnet> {
    // place → arcs touching it
    let mut by_place: IndexMap<PlaceId, Vec<ArcId>> = IndexMap::new();
    for (id, arc) in net.arcs() {
        by_place.entry(arc.place()).or_default().push(id);
    }

    let seeds = net
        .initializers()
        .filter_map(|(_, init)| init.output())
        .chain(net.places().map(|(id, _)| id));

    let mut seen_places: IndexSet<PlaceId> = IndexSet::new();
    let mut seen_transitions: IndexSet<TransitionId> = IndexSet::new();
    let mut subnets = Vec::new();

    for seed in seeds {
        if seen_places.contains(&seed) || net.place(seed).is_none() {
            continue;
        }
        let mut subnet = Subnet::default();
        let mut queue = VecDeque::from([seed]);
        seen_places.insert(seed);

        while let Some(place) = queue.pop_front() {
            subnet.places.push(place);
            for arc_id in by_place.get(&place).into_iter().flatten() {
                let Some(arc) = net.arc(*arc_id) else {
                    continue;
                };
                match arc.kind {
                    ArcKind::Source { initializer, .. } => {
                        subnet.initializers.push(initializer);
                        subnet.record(*arc_id, arc.kind, arc.weight());
                    }
                    ArcKind::Input { transition, .. } | ArcKind::Output { transition, .. } => {
                        if !seen_transitions.insert(transition) {
                            continue;
                        }
                        subnet.transitions.push(transition);
                        // 迁移的整个邻域作为整体加入
                        for (id, arc) in net.input_arcs(transition).chain(net.output_arcs(transition)) {
                            subnet.record(id, arc.kind, arc.weight());
                            if seen_places.insert(arc.place()) {
                                queue.push_back(arc.place());
                            }
                        }
                    }
                }
            }
        }
        subnets.push(subnet);
    }

    // 没有任何弧的迁移各自成为子网
    for (id, _) in net.transitions() {
        if seen_transitions.insert(id) {
            subnets.push(Subnet {
                transitions: vec![id],
                ..Default::default()
            });
        }
    }

    for (id, init) in net.initializers() {
        if init.output().is_none() {
            subnets.push(Subnet {
                initializers: vec![id],
                ..Default::default()
            });
        }
    }

    if subnets.is_empty() {
        log::debug!("decomposition found nothing, using the whole net");
        subnets.push(Subnet::whole(net));
    }
    subnets
}
