//! 网的静态结构元素：库所、迁移、弧、初始化器与标识。
use std::fmt;
use std::time::Duration;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::net::ids::{ArcId, InitializerId, NodeKind, NodeRef, PlaceId, TransitionId};
use crate::net::task::Task;

pub type Weight = u64;
pub type Value = f64;

/// Operating mode of a net.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetMode {
    /// Plain weighted P/T net (T-model).
    #[default]
    Standard,
    /// Value-carrying tokens with per-transition tasks (S-model).
    Smart,
}

impl NetMode {
    pub fn is_smart(self) -> bool {
        self == NetMode::Smart
    }

    pub fn toggled(self) -> Self {
        match self {
            NetMode::Standard => NetMode::Smart,
            NetMode::Smart => NetMode::Standard,
        }
    }

    /// S-model 下弧权重退化为存在性（0/1）。
    pub fn normalize(self, weight: Weight) -> Weight {
        match self {
            NetMode::Standard => weight,
            NetMode::Smart => weight.min(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Immutable scalar carried by one unit of flow in the S-model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartToken(Value);

impl SmartToken {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn value(self) -> Value {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    name: String,
    pub position: Position,
    tokens: Weight,
    value: Option<Value>,
    initial_tokens: Weight,
    initial_value: Option<Value>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_tokens(name, 0)
    }

    pub fn with_tokens(name: impl Into<String>, tokens: Weight) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            tokens,
            value: None,
            initial_tokens: tokens,
            initial_value: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.set_value(Some(value));
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn tokens(&self) -> Weight {
        self.tokens
    }

    /// 仅当库所持有 token 时才有值。
    pub fn value(&self) -> Option<Value> {
        if self.tokens > 0 { self.value } else { None }
    }

    pub fn smart_token(&self) -> Option<SmartToken> {
        self.value().map(SmartToken::new)
    }

    pub fn initial_tokens(&self) -> Weight {
        self.initial_tokens
    }

    pub fn initial_value(&self) -> Option<Value> {
        self.initial_value
    }

    /// Editor operation: sets both the current and the initial marking.
    pub fn set_tokens(&mut self, tokens: Weight) {
        self.tokens = tokens;
        self.initial_tokens = tokens;
    }

    /// Editor operation: sets both the current and the initial value.
    pub fn set_value(&mut self, value: Option<Value>) {
        self.value = value;
        self.initial_value = value;
    }

    pub fn add_tokens(&mut self, units: Weight) {
        self.tokens = self.tokens.saturating_add(units);
    }

    /// Removes `units` tokens. A removal that would go below zero is a no-op
    /// and returns `false`.
    pub fn remove_tokens(&mut self, units: Weight) -> bool {
        match self.tokens.checked_sub(units) {
            Some(left) => {
                self.tokens = left;
                if left == 0 {
                    self.value = None;
                }
                true
            }
            None => false,
        }
    }

    /// Lands `units` tokens; a carried token replaces the stored value.
    pub fn deposit(&mut self, units: Weight, token: Option<SmartToken>) {
        self.add_tokens(units);
        if let Some(token) = token {
            self.value = Some(token.value());
        }
    }

    pub fn reset(&mut self) {
        self.tokens = self.initial_tokens;
        self.value = self.initial_value;
    }
}

bitflags! {
    /// Routing switches of an S-model transition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Routing: u8 {
        const PASS_ON_TRUE = 1;
        const PASS_ON_FALSE = 1 << 1;
        const PASS_PREVIOUS_VALUE = 1 << 2;
    }
}

impl Default for Routing {
    fn default() -> Self {
        Routing::PASS_ON_TRUE
    }
}

/// Place ids used to sequence multiple pending input values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenOrder(pub Vec<PlaceId>);

impl TokenOrder {
    pub fn places(&self) -> &[PlaceId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A value that reached a transition and waits for the commit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingToken {
    pub source: PlaceId,
    pub units: Weight,
    pub token: Option<SmartToken>,
}

#[derive(Clone, PartialEq)]
pub struct Transition {
    name: String,
    pub position: Position,
    pub(crate) inputs: Vec<ArcId>,
    pub(crate) outputs: Vec<ArcId>,
    pub task: Task,
    pub(crate) token_order: Option<TokenOrder>,
    pub routing: Routing,
    pub(crate) active: bool,
    pub(crate) pending: Vec<PendingToken>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            task: Task::Gate,
            token_order: None,
            routing: Routing::default(),
            active: false,
            pending: Vec::new(),
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.task = task;
        self
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Input arcs in declaration order.
    pub fn inputs(&self) -> &[ArcId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ArcId] {
        &self.outputs
    }

    pub fn token_order(&self) -> Option<&TokenOrder> {
        self.token_order.as_ref()
    }

    /// `true` while a firing is in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> &[PendingToken] {
        &self.pending
    }

    pub(crate) fn clear_transient(&mut self) {
        self.active = false;
        self.pending.clear();
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    name: String,
    pub position: Position,
    pub tokens_to_generate: u64,
    pub tokens_per_second: f64,
    pub is_continuous: bool,
    pub token_value: Value,
    pub(crate) output: Option<PlaceId>,
    pub(crate) tokens_generated: u64,
    pub(crate) last_generated: Option<Duration>,
}

impl Initializer {
    pub fn new(name: impl Into<String>, tokens_to_generate: u64, tokens_per_second: f64) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            tokens_to_generate,
            tokens_per_second,
            is_continuous: false,
            token_value: 0.0,
            output: None,
            tokens_generated: 0,
            last_generated: None,
        }
    }

    pub fn continuous(mut self) -> Self {
        self.is_continuous = true;
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.token_value = value;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn output(&self) -> Option<PlaceId> {
        self.output
    }

    pub fn tokens_generated(&self) -> u64 {
        self.tokens_generated
    }

    /// Generation period, `None` when the rate is not positive.
    pub fn interval(&self) -> Option<Duration> {
        if self.tokens_per_second > 0.0 && self.tokens_per_second.is_finite() {
            Duration::try_from_secs_f64(1.0 / self.tokens_per_second).ok()
        } else {
            None
        }
    }

    pub fn has_quota(&self) -> bool {
        self.is_continuous || self.tokens_generated < self.tokens_to_generate
    }

    pub(crate) fn record_generation(&mut self, now: Duration) {
        self.tokens_generated += 1;
        self.last_generated = Some(now);
    }

    pub fn reset(&mut self) {
        self.tokens_generated = 0;
        self.last_generated = None;
    }
}

/// Endpoints of an arc; the variant fixes the direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArcKind {
    Input {
        place: PlaceId,
        transition: TransitionId,
    },
    Output {
        transition: TransitionId,
        place: PlaceId,
    },
    Source {
        initializer: InitializerId,
        place: PlaceId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Arc {
    pub kind: ArcKind,
    pub(crate) weight: Weight,
}

impl Arc {
    pub fn new(kind: ArcKind, weight: Weight) -> Self {
        Self { kind, weight }
    }

    /// `true` for place → transition arcs.
    pub fn is_input(&self) -> bool {
        matches!(self.kind, ArcKind::Input { .. })
    }

    pub fn place(&self) -> PlaceId {
        match self.kind {
            ArcKind::Input { place, .. }
            | ArcKind::Output { place, .. }
            | ArcKind::Source { place, .. } => place,
        }
    }

    pub fn transition(&self) -> Option<TransitionId> {
        match self.kind {
            ArcKind::Input { transition, .. } | ArcKind::Output { transition, .. } => {
                Some(transition)
            }
            ArcKind::Source { .. } => None,
        }
    }

    pub fn source(&self) -> NodeRef {
        match self.kind {
            ArcKind::Input { place, .. } => NodeRef::Place(place),
            ArcKind::Output { transition, .. } => NodeRef::Transition(transition),
            ArcKind::Source { initializer, .. } => NodeRef::Initializer(initializer),
        }
    }

    pub fn target(&self) -> NodeRef {
        match self.kind {
            ArcKind::Input { transition, .. } => NodeRef::Transition(transition),
            ArcKind::Output { place, .. } | ArcKind::Source { place, .. } => NodeRef::Place(place),
        }
    }

    pub fn touches(&self, node: NodeRef) -> bool {
        self.source() == node || self.target() == node
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    pub fn effective_weight(&self, mode: NetMode) -> Weight {
        mode.normalize(self.weight)
    }
}

/// Borrowed view of a node, tagged by role.
#[derive(Debug, Clone, Copy)]
pub enum NetNode<'a> {
    Place(&'a Place),
    Transition(&'a Transition),
    Initializer(&'a Initializer),
}

impl NetNode<'_> {
    pub fn name(&self) -> &str {
        match self {
            NetNode::Place(place) => place.name(),
            NetNode::Transition(transition) => transition.name(),
            NetNode::Initializer(initializer) => initializer.name(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NetNode::Place(_) => NodeKind::Place,
            NetNode::Transition(_) => NodeKind::Transition,
            NetNode::Initializer(_) => NodeKind::Initializer,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            NetNode::Place(place) => place.position,
            NetNode::Transition(transition) => transition.position,
            NetNode::Initializer(initializer) => initializer.position,
        }
    }
}

/// Token counts across all places at one point in time.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Marking(pub IndexMap<PlaceId, Weight>);

impl Marking {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, Weight)> + '_ {
        self.0.iter().map(|(place, tokens)| (*place, *tokens))
    }

    pub fn tokens(&self, place: PlaceId) -> Weight {
        self.0.get(&place).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Weight {
        self.0.values().sum()
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (place, tokens) in self.iter() {
            map.entry(&place, &tokens);
        }
        map.finish()
    }
}
