//! Handcrafted graphs for unit tests.

use crate::graph::{Edge, VariationGraph};

/// Two nodes in a line: `ACGT -> ACGT`.
pub(crate) fn create_linear_graph() -> VariationGraph {
    let mut g = VariationGraph::new();
    g.add_node(1, "ACGT");
    g.add_node(2, "ACGT");
    g.add_edge(Edge::simple(1, 2)).unwrap();

    g
}

/// A single SNP bubble: `A -> {GG, GT} -> C` with node IDs 1..4.
pub(crate) fn create_snp_bubble_graph() -> VariationGraph {
    let mut g = VariationGraph::new();
    g.add_node(1, "A");
    g.add_node(2, "GG");
    g.add_node(3, "GT");
    g.add_node(4, "C");

    for (s, t) in [(1, 2), (1, 3), (2, 4), (3, 4)] {
        g.add_edge(Edge::simple(s, t)).unwrap();
    }

    g
}

/// Two nodes joined by a single reversing edge.
pub(crate) fn create_reversing_edge_graph() -> VariationGraph {
    let mut g = VariationGraph::new();
    g.add_node(1, "ACGT");
    g.add_node(2, "ACGT");
    g.add_edge(Edge::new(1, true, 2, false)).unwrap();

    g
}

/// An outer bubble from 1 to 6 with a deletion allele, containing an inner
/// bubble from 2 to 5:
///
/// ```text
///      2 -> {3, 4} -> 5
///     /               \
///    1 ----------------> 6
/// ```
pub(crate) fn create_nested_sites_graph() -> VariationGraph {
    let mut g = VariationGraph::new();
    g.add_node(1, "A");
    g.add_node(2, "T");
    g.add_node(3, "G");
    g.add_node(4, "C");
    g.add_node(5, "T");
    g.add_node(6, "A");

    for (s, t) in [(1, 2), (2, 3), (2, 4), (3, 5), (4, 5), (5, 6), (1, 6)] {
        g.add_edge(Edge::simple(s, t)).unwrap();
    }

    g
}
