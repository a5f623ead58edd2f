//! 可编辑的网模型：节点与弧的增删改、可激发判定、标识重置与导出。
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

use crate::net::ids::{ArcId, InitializerId, NodeKind, NodeRef, PlaceId, TransitionId};
use crate::net::structure::{
    Arc, ArcKind, Initializer, Marking, NetMode, NetNode, Place, Routing, TokenOrder, Transition,
    Weight,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetError {
    #[error("{kind} named {name:?} already exists")]
    DuplicateName { kind: NodeKind, name: String },
    #[error("names must not be empty")]
    EmptyName,
    #[error("name {0:?} must not contain ','")]
    InvalidName(String),
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeRef),
    #[error("arc {0:?} does not exist")]
    UnknownArc(ArcId),
    #[error("an arc from {from:?} to {to:?} already exists")]
    DuplicateArc { from: NodeRef, to: NodeRef },
    #[error("arcs cannot connect {from:?} to {to:?}")]
    InvalidEndpoints { from: NodeRef, to: NodeRef },
    #[error("arc weight must be at least 1")]
    ZeroWeight,
    #[error("weighted arcs ({0}) are not allowed in the smart model")]
    WeightedSmartArc(Weight),
    #[error("initializer {0:?} already feeds a place")]
    InitializerConnected(InitializerId),
    #[error("token order names unknown place {0:?}")]
    UnknownOrderPlace(String),
    #[error("arc {0:?} references a missing node or is not linked")]
    DanglingArc(ArcId),
}

/// Petri 网连通性诊断报告
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DiagnosticReport {
    /// 孤立库所（无任何连接的弧）
    pub isolated_places: Vec<String>,
    /// 孤立变迁（无任何连接的弧）
    pub isolated_transitions: Vec<String>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} places, {} transitions",
            self.total_places, self.total_transitions
        )?;
        if !self.isolated_places.is_empty() {
            writeln!(f, "isolated places: {}", self.isolated_places.join(", "))?;
        }
        if !self.isolated_transitions.is_empty() {
            writeln!(
                f,
                "isolated transitions: {}",
                self.isolated_transitions.join(", ")
            )?;
        }
        for warning in &self.warnings {
            writeln!(f, "  - {warning}")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Net {
    mode: NetMode,
    pub(crate) places: IndexMap<PlaceId, Place>,
    pub(crate) transitions: IndexMap<TransitionId, Transition>,
    pub(crate) initializers: IndexMap<InitializerId, Initializer>,
    pub(crate) arcs: IndexMap<ArcId, Arc>,
    next_id: u32,
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Net")
            .field("mode", &self.mode)
            .field("places", &self.places)
            .field("transitions", &self.transitions)
            .field("initializers", &self.initializers)
            .field("arcs", &self.arcs)
            .finish()
    }
}

impl Default for Net {
    fn default() -> Self {
        Self::empty()
    }
}

fn check_name(name: &str) -> Result<(), NetError> {
    if name.trim().is_empty() {
        return Err(NetError::EmptyName);
    }
    if name.contains(',') {
        return Err(NetError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Net {
    pub fn empty() -> Self {
        Self::new(NetMode::Standard)
    }

    pub fn new(mode: NetMode) -> Self {
        Self {
            mode,
            places: IndexMap::new(),
            transitions: IndexMap::new(),
            initializers: IndexMap::new(),
            arcs: IndexMap::new(),
            next_id: 0,
        }
    }

    pub fn mode(&self) -> NetMode {
        self.mode
    }

    /// Switches the operating mode. Stored arc weights are kept; the smart
    /// model ignores them.
    pub fn set_mode(&mut self, mode: NetMode) {
        if self.mode != mode {
            log::info!("net mode {:?} -> {:?}", self.mode, mode);
            self.mode = mode;
        }
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_unique(&self, kind: NodeKind, name: &str, except: Option<NodeRef>) -> Result<(), NetError> {
        let taken = match kind {
            NodeKind::Place => self
                .places
                .iter()
                .any(|(id, p)| p.name() == name && except != Some(NodeRef::Place(*id))),
            NodeKind::Transition => self
                .transitions
                .iter()
                .any(|(id, t)| t.name() == name && except != Some(NodeRef::Transition(*id))),
            NodeKind::Initializer => self
                .initializers
                .iter()
                .any(|(id, i)| i.name() == name && except != Some(NodeRef::Initializer(*id))),
        };
        if taken {
            return Err(NetError::DuplicateName {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_place(&mut self, place: Place) -> Result<PlaceId, NetError> {
        check_name(place.name())?;
        self.ensure_unique(NodeKind::Place, place.name(), None)?;
        let id = PlaceId::new(self.allocate());
        self.places.insert(id, place);
        Ok(id)
    }

    pub fn add_transition(&mut self, transition: Transition) -> Result<TransitionId, NetError> {
        check_name(transition.name())?;
        self.ensure_unique(NodeKind::Transition, transition.name(), None)?;
        let mut transition = transition;
        // 弧只能通过 add_arc 建立
        transition.inputs.clear();
        transition.outputs.clear();
        transition.token_order = None;
        transition.clear_transient();
        let id = TransitionId::new(self.allocate());
        self.transitions.insert(id, transition);
        Ok(id)
    }

    pub fn add_initializer(&mut self, initializer: Initializer) -> Result<InitializerId, NetError> {
        check_name(initializer.name())?;
        self.ensure_unique(NodeKind::Initializer, initializer.name(), None)?;
        let mut initializer = initializer;
        initializer.output = None;
        initializer.reset();
        let id = InitializerId::new(self.allocate());
        self.initializers.insert(id, initializer);
        Ok(id)
    }

    pub fn rename(&mut self, node: NodeRef, name: impl Into<String>) -> Result<(), NetError> {
        let name = name.into();
        check_name(&name)?;
        if !self.contains(node) {
            return Err(NetError::UnknownNode(node));
        }
        self.ensure_unique(node.kind(), &name, Some(node))?;
        match node {
            NodeRef::Place(id) => self.places[&id].set_name(name),
            NodeRef::Transition(id) => self.transitions[&id].set_name(name),
            NodeRef::Initializer(id) => self.initializers[&id].set_name(name),
        }
        Ok(())
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        match node {
            NodeRef::Place(id) => self.places.contains_key(&id),
            NodeRef::Transition(id) => self.transitions.contains_key(&id),
            NodeRef::Initializer(id) => self.initializers.contains_key(&id),
        }
    }

    pub fn node(&self, node: NodeRef) -> Option<NetNode<'_>> {
        match node {
            NodeRef::Place(id) => self.places.get(&id).map(NetNode::Place),
            NodeRef::Transition(id) => self.transitions.get(&id).map(NetNode::Transition),
            NodeRef::Initializer(id) => self.initializers.get(&id).map(NetNode::Initializer),
        }
    }

    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(&id)
    }

    pub fn place_mut(&mut self, id: PlaceId) -> Option<&mut Place> {
        self.places.get_mut(&id)
    }

    pub fn transition(&self, id: TransitionId) -> Option<&Transition> {
        self.transitions.get(&id)
    }

    pub fn transition_mut(&mut self, id: TransitionId) -> Option<&mut Transition> {
        self.transitions.get_mut(&id)
    }

    pub fn initializer(&self, id: InitializerId) -> Option<&Initializer> {
        self.initializers.get(&id)
    }

    pub fn arc(&self, id: ArcId) -> Option<&Arc> {
        self.arcs.get(&id)
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> + '_ {
        self.places.iter().map(|(id, place)| (*id, place))
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> + '_ {
        self.transitions.iter().map(|(id, t)| (*id, t))
    }

    pub fn initializers(&self) -> impl Iterator<Item = (InitializerId, &Initializer)> + '_ {
        self.initializers.iter().map(|(id, i)| (*id, i))
    }

    pub(crate) fn initializers_mut(
        &mut self,
    ) -> impl Iterator<Item = (InitializerId, &mut Initializer)> + '_ {
        self.initializers.iter_mut().map(|(id, i)| (*id, i))
    }

    pub fn arcs(&self) -> impl Iterator<Item = (ArcId, &Arc)> + '_ {
        self.arcs.iter().map(|(id, arc)| (*id, arc))
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty() && self.transitions.is_empty() && self.initializers.is_empty()
    }

    pub fn find_place(&self, name: &str) -> Option<PlaceId> {
        self.places
            .iter()
            .find_map(|(id, p)| (p.name() == name).then_some(*id))
    }

    pub fn find_transition(&self, name: &str) -> Option<TransitionId> {
        self.transitions
            .iter()
            .find_map(|(id, t)| (t.name() == name).then_some(*id))
    }

    pub fn find_initializer(&self, name: &str) -> Option<InitializerId> {
        self.initializers
            .iter()
            .find_map(|(id, i)| (i.name() == name).then_some(*id))
    }

    /// Connects two nodes. Valid directions are place → transition,
    /// transition → place and initializer → place.
    pub fn add_arc(
        &mut self,
        from: impl Into<NodeRef>,
        to: impl Into<NodeRef>,
        weight: Weight,
    ) -> Result<ArcId, NetError> {
        let (from, to) = (from.into(), to.into());
        for node in [from, to] {
            if !self.contains(node) {
                return Err(NetError::UnknownNode(node));
            }
        }
        let kind = match (from, to) {
            (NodeRef::Place(place), NodeRef::Transition(transition)) => {
                ArcKind::Input { place, transition }
            }
            (NodeRef::Transition(transition), NodeRef::Place(place)) => {
                ArcKind::Output { transition, place }
            }
            (NodeRef::Initializer(initializer), NodeRef::Place(place)) => {
                if self.initializers[&initializer].output.is_some() {
                    return Err(NetError::InitializerConnected(initializer));
                }
                ArcKind::Source { initializer, place }
            }
            _ => return Err(NetError::InvalidEndpoints { from, to }),
        };
        let weight = match kind {
            ArcKind::Source { .. } => 1,
            _ => self.check_weight(weight)?,
        };
        if self
            .arcs
            .values()
            .any(|arc| arc.source() == from && arc.target() == to)
        {
            return Err(NetError::DuplicateArc { from, to });
        }

        let id = ArcId::new(self.allocate());
        self.arcs.insert(id, Arc::new(kind, weight));
        match kind {
            ArcKind::Input { transition, .. } => self.transitions[&transition].inputs.push(id),
            ArcKind::Output { transition, .. } => self.transitions[&transition].outputs.push(id),
            ArcKind::Source { initializer, place } => {
                self.initializers[&initializer].output = Some(place)
            }
        }
        Ok(id)
    }

    fn check_weight(&self, weight: Weight) -> Result<Weight, NetError> {
        if weight == 0 {
            return Err(NetError::ZeroWeight);
        }
        if self.mode.is_smart() && weight > 1 {
            return Err(NetError::WeightedSmartArc(weight));
        }
        Ok(weight)
    }

    pub fn set_arc_weight(&mut self, id: ArcId, weight: Weight) -> Result<(), NetError> {
        let weight = self.check_weight(weight)?;
        let arc = self.arcs.get_mut(&id).ok_or(NetError::UnknownArc(id))?;
        if !matches!(arc.kind, ArcKind::Source { .. }) {
            arc.weight = weight;
        }
        Ok(())
    }

    pub fn remove_arc(&mut self, id: ArcId) -> Result<Arc, NetError> {
        let arc = self.arcs.shift_remove(&id).ok_or(NetError::UnknownArc(id))?;
        match arc.kind {
            ArcKind::Input { transition, .. } => {
                if let Some(t) = self.transitions.get_mut(&transition) {
                    t.inputs.retain(|arc_id| *arc_id != id);
                }
            }
            ArcKind::Output { transition, .. } => {
                if let Some(t) = self.transitions.get_mut(&transition) {
                    t.outputs.retain(|arc_id| *arc_id != id);
                }
            }
            ArcKind::Source { initializer, .. } => {
                if let Some(init) = self.initializers.get_mut(&initializer) {
                    init.output = None;
                }
            }
        }
        Ok(arc)
    }

    /// Deletes a node together with every incident arc and scrubs the token
    /// orders that mention a deleted place.
    pub fn remove_node(&mut self, node: NodeRef) -> Result<(), NetError> {
        if !self.contains(node) {
            return Err(NetError::UnknownNode(node));
        }
        let incident = self
            .arcs
            .iter()
            .filter(|(_, arc)| arc.touches(node))
            .map(|(id, _)| *id)
            .collect::<Vec<_>>();
        for arc in incident {
            self.remove_arc(arc)?;
        }
        match node {
            NodeRef::Place(id) => {
                self.places.shift_remove(&id);
                for transition in self.transitions.values_mut() {
                    if let Some(order) = transition.token_order.as_mut() {
                        order.0.retain(|place| *place != id);
                        if order.is_empty() {
                            transition.token_order = None;
                        }
                    }
                }
            }
            NodeRef::Transition(id) => {
                self.transitions.shift_remove(&id);
            }
            NodeRef::Initializer(id) => {
                self.initializers.shift_remove(&id);
            }
        }
        log::debug!("removed {node:?}");
        Ok(())
    }

    /// Parses a comma separated list of place names; an empty spec clears
    /// the order.
    pub fn set_token_order(&mut self, transition: TransitionId, spec: &str) -> Result<(), NetError> {
        if !self.transitions.contains_key(&transition) {
            return Err(NetError::UnknownNode(NodeRef::Transition(transition)));
        }
        let mut places = Vec::new();
        for name in spec.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let place = self
                .find_place(name)
                .ok_or_else(|| NetError::UnknownOrderPlace(name.to_string()))?;
            places.push(place);
        }
        self.transitions[&transition].token_order =
            (!places.is_empty()).then_some(TokenOrder(places));
        Ok(())
    }

    /// Token order rendered with the current place names.
    pub fn token_order_spec(&self, transition: TransitionId) -> Option<String> {
        let order = self.transitions.get(&transition)?.token_order()?;
        let names = order
            .places()
            .iter()
            .filter_map(|place| self.places.get(place).map(Place::name))
            .collect::<Vec<_>>();
        Some(names.join(","))
    }

    pub fn input_arcs(&self, transition: TransitionId) -> impl Iterator<Item = (ArcId, &Arc)> + '_ {
        self.transitions
            .get(&transition)
            .into_iter()
            .flat_map(move |t| {
                t.inputs
                    .iter()
                    .filter_map(move |id| self.arcs.get(id).map(|arc| (*id, arc)))
            })
    }

    pub fn output_arcs(&self, transition: TransitionId) -> impl Iterator<Item = (ArcId, &Arc)> + '_ {
        self.transitions
            .get(&transition)
            .into_iter()
            .flat_map(move |t| {
                t.outputs
                    .iter()
                    .filter_map(move |id| self.arcs.get(id).map(|arc| (*id, arc)))
            })
    }

    /// T-model: every input place holds at least the arc weight.
    /// S-model: every input place holds a token.
    /// A transition without input arcs is never enabled.
    pub fn is_enabled(&self, transition: TransitionId) -> bool {
        let Some(t) = self.transitions.get(&transition) else {
            return false;
        };
        if t.inputs.is_empty() {
            return false;
        }
        t.inputs.iter().all(|arc_id| {
            self.arcs
                .get(arc_id)
                .and_then(|arc| {
                    self.places
                        .get(&arc.place())
                        .map(|place| place.tokens() >= arc.effective_weight(self.mode))
                })
                .unwrap_or(false)
        })
    }

    pub fn enabled_transitions(&self) -> Vec<TransitionId> {
        self.transitions
            .keys()
            .copied()
            .filter(|id| self.is_enabled(*id))
            .collect()
    }

    pub fn marking(&self) -> Marking {
        Marking(
            self.places
                .iter()
                .map(|(id, place)| (*id, place.tokens()))
                .collect(),
        )
    }

    /// Restores `M₀` and clears every piece of transient firing state.
    pub fn reset_marking(&mut self) {
        for place in self.places.values_mut() {
            place.reset();
        }
        for transition in self.transitions.values_mut() {
            transition.clear_transient();
        }
        for initializer in self.initializers.values_mut() {
            initializer.reset();
        }
    }

    /// Checks that every arc endpoint exists and that arc lists agree with
    /// the arc table.
    pub fn validate(&self) -> Result<(), NetError> {
        for (id, arc) in &self.arcs {
            if !self.contains(arc.source()) || !self.contains(arc.target()) {
                return Err(NetError::DanglingArc(*id));
            }
            let linked = match arc.kind {
                ArcKind::Input { transition, .. } => self.transitions[&transition].inputs.contains(id),
                ArcKind::Output { transition, .. } => {
                    self.transitions[&transition].outputs.contains(id)
                }
                ArcKind::Source { initializer, place } => {
                    self.initializers[&initializer].output == Some(place)
                }
            };
            if !linked {
                return Err(NetError::DanglingArc(*id));
            }
        }
        for transition in self.transitions.values() {
            for id in transition.inputs.iter().chain(&transition.outputs) {
                if !self.arcs.contains_key(id) {
                    return Err(NetError::DanglingArc(*id));
                }
            }
        }
        Ok(())
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph PetriNet {{");
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        let nodes = self
            .places
            .keys()
            .map(|id| NodeRef::Place(*id))
            .chain(self.transitions.keys().map(|id| NodeRef::Transition(*id)))
            .chain(self.initializers.keys().map(|id| NodeRef::Initializer(*id)));
        for node in nodes {
            let Some(view) = self.node(node) else { continue };
            let mut label = escape_label(view.name());
            match view {
                NetNode::Place(place) => {
                    let _ = write!(&mut label, "\\n{}", place.tokens());
                    if let Some(value) = place.value().filter(|_| self.mode.is_smart()) {
                        let _ = write!(&mut label, " [{value}]");
                    }
                }
                NetNode::Transition(transition)
                    if self.mode.is_smart() && transition.task != Default::default() =>
                {
                    let _ = write!(&mut label, "\\n{}", escape_label(&transition.task.to_string()));
                }
                _ => {}
            }
            let (shape, fill) = match view.kind() {
                NodeKind::Place => ("circle", "#e3f2fd"),
                NodeKind::Transition => ("box", "#ffe0b2"),
                NodeKind::Initializer => ("diamond", "#c8e6c9"),
            };
            let pos = view.position();
            let _ = writeln!(
                &mut dot,
                "    {} [label=\"{}\", shape={}, style=filled, fillcolor=\"{}\", pos=\"{},{}\"];",
                dot_node(node),
                label,
                shape,
                fill,
                pos.x,
                pos.y
            );
        }

        for arc in self.arcs.values() {
            let weight = arc.effective_weight(self.mode);
            if weight == 1 {
                let _ = writeln!(&mut dot, "    {} -> {};", dot_node(arc.source()), dot_node(arc.target()));
            } else {
                let _ = writeln!(
                    &mut dot,
                    "    {} -> {} [label=\"{}\"];",
                    dot_node(arc.source()),
                    dot_node(arc.target()),
                    weight
                );
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }

    /// 诊断信息：检测孤立节点与永远无法激发/获得 token 的元素
    pub fn diagnose_connectivity(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            total_places: self.places_len(),
            total_transitions: self.transitions_len(),
            ..Default::default()
        };

        for (id, place) in &self.places {
            let node = NodeRef::Place(*id);
            let fed = self.arcs.values().any(|arc| arc.target() == node);
            let drained = self.arcs.values().any(|arc| arc.source() == node);
            if !fed && !drained {
                report.isolated_places.push(place.name().to_string());
            } else if !fed && place.initial_tokens() == 0 {
                report.warnings.push(format!(
                    "place '{}' has no incoming arc and no initial tokens, it never receives tokens",
                    place.name()
                ));
            }
        }

        for transition in self.transitions.values() {
            if transition.inputs.is_empty() && transition.outputs.is_empty() {
                report.isolated_transitions.push(transition.name().to_string());
            } else if transition.inputs.is_empty() {
                report.warnings.push(format!(
                    "transition '{}' has no input arc and can never fire",
                    transition.name()
                ));
            }
            let routes_result = transition
                .routing
                .intersects(Routing::PASS_ON_TRUE | Routing::PASS_ON_FALSE);
            if self.mode.is_smart() && transition.task.is_comparison() && !routes_result {
                report.warnings.push(format!(
                    "transition '{}' compares but routes neither result, it never emits",
                    transition.name()
                ));
            }
        }

        for initializer in self.initializers.values() {
            if initializer.output.is_none() {
                report.warnings.push(format!(
                    "initializer '{}' has no output place",
                    initializer.name()
                ));
            } else if initializer.interval().is_none() {
                report.warnings.push(format!(
                    "initializer '{}' has a non-positive rate and never generates",
                    initializer.name()
                ));
            }
        }

        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose_connectivity();
        if report.has_issues() {
            log::warn!("connectivity diagnostics:\n{report}");
        } else {
            log::info!("connectivity check passed, no isolated nodes");
        }
    }
}

fn dot_node(node: NodeRef) -> String {
    match node {
        NodeRef::Place(id) => format!("place_{}", id.raw()),
        NodeRef::Transition(id) => format!("trans_{}", id.raw()),
        NodeRef::Initializer(id) => format!("init_{}", id.raw()),
    }
}

fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
