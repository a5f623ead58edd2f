use indexmap::IndexMap;
use petgraph::Graph;
use petgraph::algo;
use petgraph::graph::NodeIndex;

use crate::net::core::Net;
use crate::net::ids::NodeRef;
use crate::net::structure::Weight;

/// Graph over every node of the net. Initializer edges join an initializer
/// to the place it feeds.
pub struct NetGraph {
    pub graph: Graph<NodeRef, Weight>,
    pub index: IndexMap<NodeRef, NodeIndex>,
}

impl NetGraph {
    pub fn new(net: &Net) -> Self {
        let mut graph = Graph::new();
        let mut index = IndexMap::new();
        let nodes = net
            .places()
            .map(|(id, _)| NodeRef::Place(id))
            .chain(net.transitions().map(|(id, _)| NodeRef::Transition(id)))
            .chain(net.initializers().map(|(id, _)| NodeRef::Initializer(id)));
        for node in nodes {
            index.insert(node, graph.add_node(node));
        }
        for (_, arc) in net.arcs() {
            if let (Some(from), Some(to)) = (index.get(&arc.source()), index.get(&arc.target())) {
                graph.add_edge(*from, *to, arc.weight());
            }
        }
        Self { graph, index }
    }

    /// Weakly connected components.
    pub fn component_count(&self) -> usize {
        algo::connected_components(&self.graph)
    }
}
