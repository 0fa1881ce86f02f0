//! The variation-graph container: DNA-labeled nodes, side-flagged edges,
//! and embedded named paths.

pub mod paths;

#[cfg(test)]
pub(crate) mod mock;

use petgraph::prelude::{NodeIndex, StableDiGraph};
use petgraph::algo::toposort;
use petgraph::visit::EdgeRef;
use petgraph::{Incoming, Outgoing};

use serde::{Deserialize, Serialize};

use rustc_hash::FxHashMap;

use crate::errors::VargraphError;
use crate::graph::paths::Paths;

pub type NodeId = u64;

/// A node holds an identifier and a DNA sequence over {A,C,G,T,N}.
///
/// Sequences with other characters are accepted here but are normalized
/// to N before alignment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub sequence: String,
}

/// An edge between two node sides.
///
/// `from_start` means the edge leaves the 5′ end of `from`; `to_end` means it
/// enters the 3′ end of `to`. An edge with neither flag set is a normal
/// end-to-start edge; one with both set is a doubly-reversed edge that can be
/// walked as `to -> from`. Edges with exactly one flag set are reversing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub from_start: bool,
    pub to: NodeId,
    pub to_end: bool,
}

impl Edge {
    pub fn new(from: NodeId, from_start: bool, to: NodeId, to_end: bool) -> Self {
        Edge { from, from_start, to, to_end }
    }

    /// A normal end-to-start edge.
    pub fn simple(from: NodeId, to: NodeId) -> Self {
        Edge { from, from_start: false, to, to_end: false }
    }

    #[inline]
    pub fn is_reversing(&self) -> bool {
        self.from_start != self.to_end
    }

    /// The side of `from` this edge is attached to.
    #[inline]
    pub fn from_side(&self) -> NodeSide {
        NodeSide::new(self.from, !self.from_start)
    }

    /// The side of `to` this edge is attached to.
    #[inline]
    pub fn to_side(&self) -> NodeSide {
        NodeSide::new(self.to, self.to_end)
    }
}

/// One of the two ends of a node: `is_end` selects the 3′ (right) side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeSide {
    pub node: NodeId,
    pub is_end: bool,
}

impl NodeSide {
    pub fn new(node: NodeId, is_end: bool) -> Self {
        NodeSide { node, is_end }
    }

    /// The opposite side of the same node.
    #[inline]
    pub fn flip(&self) -> NodeSide {
        NodeSide { node: self.node, is_end: !self.is_end }
    }
}

/// A visit to a node in a chosen orientation: forward sequence when
/// `!backward`, reverse complement otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeTraversal {
    pub node: NodeId,
    pub backward: bool,
}

impl NodeTraversal {
    pub fn new(node: NodeId, backward: bool) -> Self {
        NodeTraversal { node, backward }
    }

    pub fn forward(node: NodeId) -> Self {
        NodeTraversal { node, backward: false }
    }

    /// The same node visited in the opposite orientation.
    #[inline]
    pub fn reverse(&self) -> NodeTraversal {
        NodeTraversal { node: self.node, backward: !self.backward }
    }
}

type GraphIx = NodeIndex<u32>;

/// An in-memory variation graph.
///
/// Nodes and edges live in a `StableDiGraph`; the petgraph arrow of each
/// stored edge points in walk orientation (doubly-reversed edges are stored
/// as `to -> from`), so `toposort` on the underlying graph yields an order
/// in which every non-reversing edge goes from earlier to later node.
#[derive(Debug, Default)]
pub struct VariationGraph {
    graph: StableDiGraph<Node, Edge, u32>,
    node_index: FxHashMap<NodeId, GraphIx>,
    order: Vec<GraphIx>,
    pub paths: Paths,
}

impl VariationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId, sequence: impl Into<String>) -> &Node {
        let ix = self.graph.add_node(Node { id, sequence: sequence.into() });
        self.node_index.insert(id, ix);
        self.order.push(ix);
        &self.graph[ix]
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<(), VargraphError> {
        let from_ix = *self.node_index.get(&edge.from)
            .ok_or(VargraphError::UnknownNode(edge.from))?;
        let to_ix = *self.node_index.get(&edge.to)
            .ok_or(VargraphError::UnknownNode(edge.to))?;

        // store doubly-reversed edges with the arrow in walk orientation
        if edge.from_start && edge.to_end {
            self.graph.add_edge(to_ix, from_ix, edge);
        } else {
            self.graph.add_edge(from_ix, to_ix, edge);
        }

        Ok(())
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// The i-th node in insertion order.
    pub fn node(&self, i: usize) -> &Node {
        &self.graph[self.order[i]]
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|ix| &self.graph[*ix])
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item=&Node> + '_ {
        self.order.iter().map(|ix| &self.graph[*ix])
    }

    pub fn edges(&self) -> impl Iterator<Item=&Edge> + '_ {
        self.graph.edge_weights()
    }

    pub fn total_length_of_nodes(&self) -> usize {
        self.nodes().map(|n| n.sequence.len()).sum()
    }

    /// All edges incident to a node, in either role.
    pub fn edges_of(&self, id: NodeId) -> Vec<Edge> {
        let Some(&ix) = self.node_index.get(&id) else {
            return Vec::new();
        };

        let mut edges: Vec<Edge> = self.graph.edges_directed(ix, Outgoing)
            .map(|e| *e.weight())
            .collect();
        for e in self.graph.edges_directed(ix, Incoming) {
            // self-loop edges already collected on the outgoing pass
            if e.source() != e.target() {
                edges.push(*e.weight());
            }
        }

        edges
    }

    /// All node sides connected to `side` by an edge.
    pub fn sides_of(&self, side: NodeSide) -> Vec<NodeSide> {
        let mut connected = Vec::new();
        for edge in self.edges_of(side.node) {
            if edge.from_side() == side {
                connected.push(edge.to_side());
            }
            if edge.to_side() == side {
                connected.push(edge.from_side());
            }
        }

        connected
    }

    /// The stored edge connecting two sides, if any.
    pub fn get_edge(&self, a: NodeSide, b: NodeSide) -> Option<Edge> {
        self.edges_of(a.node).into_iter().find(|e| {
            (e.from_side() == a && e.to_side() == b) || (e.from_side() == b && e.to_side() == a)
        })
    }

    /// All node traversals reachable from `t` by a single valid walk step.
    ///
    /// Leaving a forward traversal means leaving the node's 3′ end; leaving a
    /// backward traversal means leaving its 5′ end.
    pub fn nodes_next(&self, t: NodeTraversal) -> Vec<NodeTraversal> {
        let mut next = Vec::new();
        for edge in self.edges_of(t.node) {
            if t.backward {
                if edge.from == t.node && edge.from_start {
                    next.push(NodeTraversal::new(edge.to, edge.to_end));
                } else if edge.to == t.node && !edge.to_end {
                    next.push(NodeTraversal::new(edge.from, edge.from_start));
                }
            } else {
                if edge.from == t.node && !edge.from_start {
                    next.push(NodeTraversal::new(edge.to, edge.to_end));
                } else if edge.to == t.node && edge.to_end {
                    next.push(NodeTraversal::new(edge.from, edge.from_start));
                }
            }
        }

        next
    }

    /// Node IDs in topological order of the walk orientation.
    ///
    /// Fails if the arrows of the stored edges admit no topological order,
    /// which happens when the graph is cyclic or contains reversing edges
    /// that fold it back on itself.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, VargraphError> {
        let sorted = toposort(&self.graph, None)?;
        Ok(sorted.into_iter().map(|ix| self.graph[ix].id).collect())
    }
}

/// Reverse complement of a DNA string; non-ACGT characters map to N.
pub fn reverse_complement(seq: &str) -> String {
    seq.bytes().rev().map(|b| match b {
        b'A' | b'a' => 'T',
        b'C' | b'c' => 'G',
        b'G' | b'g' => 'C',
        b'T' | b't' => 'A',
        _ => 'N',
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::create_snp_bubble_graph;

    #[test]
    fn test_sides_and_edges() {
        let g = create_snp_bubble_graph();

        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 4);

        let sides = g.sides_of(NodeSide::new(1, true));
        assert_eq!(sides.len(), 2);
        assert!(sides.contains(&NodeSide::new(2, false)));
        assert!(sides.contains(&NodeSide::new(3, false)));

        assert!(g.get_edge(NodeSide::new(1, true), NodeSide::new(2, false)).is_some());
        assert!(g.get_edge(NodeSide::new(1, true), NodeSide::new(4, false)).is_none());
    }

    #[test]
    fn test_nodes_next() {
        let g = create_snp_bubble_graph();

        let mut next = g.nodes_next(NodeTraversal::forward(1));
        next.sort();
        assert_eq!(next, vec![NodeTraversal::forward(2), NodeTraversal::forward(3)]);

        // walking backward out of the bubble's right anchor reaches both alleles
        let mut prev = g.nodes_next(NodeTraversal::new(4, true));
        prev.sort();
        assert_eq!(prev, vec![NodeTraversal::new(2, true), NodeTraversal::new(3, true)]);
    }

    #[test]
    fn test_topological_sort() {
        let g = create_snp_bubble_graph();
        let order = g.topological_sort().unwrap();

        let rank: Vec<usize> = (1..=4u64)
            .map(|id| order.iter().position(|&n| n == id).unwrap())
            .collect();
        assert!(rank[0] < rank[1] && rank[0] < rank[2]);
        assert!(rank[1] < rank[3] && rank[2] < rank[3]);
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement("ACGT"), "ACGT");
        assert_eq!(reverse_complement("AACCG"), "CGGTT");
        assert_eq!(reverse_complement("AXG"), "CNT");
    }
}
