//! Nested sites: conversion of an ultrabubble decomposition into a tree of
//! self-contained sites, and enumeration of the traversals that span them.

pub mod traversal;

use rustc_hash::{FxHashMap, FxHashSet};

use serde::{Deserialize, Serialize};

use rayon::scope;
use tracing::debug;

use crate::graph::{Edge, NodeId, NodeSide, NodeTraversal, VariationGraph};

/// One bubble of an ultrabubble decomposition: entry and exit node sides and
/// the set of nodes owned by this bubble directly. Nodes living inside a
/// child bubble (its anchors included) belong to that child's `contents`,
/// not to this one.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bubble {
    pub start: NodeSide,
    pub end: NodeSide,
    pub contents: Vec<NodeId>,
}

#[derive(Debug)]
struct BubbleTreeNode {
    bubble: Option<Bubble>,
    children: Vec<usize>,
}

/// A rooted tree of bubbles. The root is a placeholder carrying no bubble;
/// its children are the top-level bubbles.
#[derive(Debug)]
pub struct BubbleTree {
    nodes: Vec<BubbleTreeNode>,
}

impl BubbleTree {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        BubbleTree {
            nodes: vec![BubbleTreeNode { bubble: None, children: Vec::new() }],
        }
    }

    /// Attach a bubble under `parent` and return its index.
    pub fn add_bubble(&mut self, parent: usize, bubble: Bubble) -> usize {
        let ix = self.nodes.len();
        self.nodes.push(BubbleTreeNode { bubble: Some(bubble), children: Vec::new() });
        self.nodes[parent].children.push(ix);

        ix
    }

    pub fn is_root(&self, ix: usize) -> bool {
        ix == Self::ROOT
    }

    pub fn bubble(&self, ix: usize) -> Option<&Bubble> {
        self.nodes[ix].bubble.as_ref()
    }

    pub fn children(&self, ix: usize) -> &[usize] {
        &self.nodes[ix].children
    }

    /// Visit every tree node in postorder (children before parents, the root
    /// last).
    pub fn for_each_postorder(&self, mut visitor: impl FnMut(usize)) {
        self.postorder_from(Self::ROOT, &mut visitor);
    }

    fn postorder_from(&self, ix: usize, visitor: &mut impl FnMut(usize)) {
        for &child in &self.nodes[ix].children {
            self.postorder_from(child, visitor);
        }
        visitor(ix);
    }
}

impl Default for BubbleTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A connected subgraph with designated entry and exit traversals, its owned
/// nodes and edges, and the child sites nested inside it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NestedSite {
    /// The traversal entering the site.
    pub start: NodeTraversal,
    /// The traversal leaving the site.
    pub end: NodeTraversal,
    pub nodes: FxHashSet<NodeId>,
    pub edges: FxHashSet<Edge>,
    pub children: Vec<NestedSite>,
    /// Maps each child's entry traversal and reversed exit traversal to the
    /// child's position in `children`.
    pub child_border_index: FxHashMap<NodeTraversal, usize>,
}

/// One step of a site traversal: either a node visit or a child site crossed
/// atomically in the given orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visit {
    Node(NodeTraversal),
    Child { child: usize, backward: bool },
}

/// A walk from a site's start to its end.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteTraversal {
    pub visits: Vec<Visit>,
}

/// Converts a bubble tree over a graph into [`NestedSite`]s and hands the
/// top-level ones to a consumer.
pub struct SiteFinder<'a> {
    graph: &'a VariationGraph,
}

impl<'a> SiteFinder<'a> {
    pub fn new(graph: &'a VariationGraph) -> Self {
        SiteFinder { graph }
    }

    /// Build all top-level sites, children fully embedded.
    pub fn top_level_sites(&self, tree: &BubbleTree) -> Vec<NestedSite> {
        // holds converted children until their parents are ready
        let mut converted: FxHashMap<usize, NestedSite> = FxHashMap::default();

        tree.for_each_postorder(|ix| {
            if tree.is_root(ix) {
                return;
            }

            let bubble = tree.bubble(ix).unwrap();
            let site = self.convert_bubble(tree, ix, bubble, &mut converted);
            converted.insert(ix, site);
        });

        // everything left unconsumed hangs off the root
        let sites: Vec<NestedSite> = tree.children(BubbleTree::ROOT)
            .iter()
            .map(|ix| converted.remove(ix).unwrap())
            .collect();
        debug!(count = sites.len(), "built top-level sites");

        sites
    }

    /// Process every top-level site concurrently. Each site is moved into
    /// its task; the call returns only after all tasks finish.
    pub fn for_each_site_parallel<F>(&self, tree: &BubbleTree, lambda: F)
    where
        F: Fn(NestedSite) + Send + Sync,
    {
        let sites = self.top_level_sites(tree);

        let lambda = &lambda;
        scope(|s| {
            for site in sites {
                s.spawn(move |_| lambda(site));
            }
        });
    }

    fn convert_bubble(
        &self,
        tree: &BubbleTree,
        ix: usize,
        bubble: &Bubble,
        converted: &mut FxHashMap<usize, NestedSite>,
    ) -> NestedSite {
        // preserve the original endpoint ordering: swapping the anchors
        // without flipping their orientations would make an inside-out site
        let mut site = NestedSite {
            start: NodeTraversal::new(bubble.start.node, !bubble.start.is_end),
            end: NodeTraversal::new(bubble.end.node, bubble.end.is_end),
            nodes: bubble.contents.iter().copied().collect(),
            edges: FxHashSet::default(),
            children: Vec::new(),
            child_border_index: FxHashMap::default(),
        };
        site.nodes.insert(site.start.node);
        site.nodes.insert(site.end.node);

        for child_ix in tree.children(ix) {
            // children were converted first by the postorder walk
            let child = converted.remove(child_ix)
                .expect("children are converted before their parents");
            site.children.push(child);

            let idx = site.children.len() - 1;
            let child = &site.children[idx];
            site.child_border_index.insert(child.start, idx);
            site.child_border_index.insert(child.end.reverse(), idx);
        }

        // edges on internal nodes belong to this site outright
        for &node_id in &site.nodes {
            if node_id == site.start.node || node_id == site.end.node {
                continue;
            }
            for edge in self.graph.edges_of(node_id) {
                site.edges.insert(edge);
            }
        }

        // edges reaching a child through the outer side of its anchors
        for child in &site.children {
            let start_outer = NodeSide::new(child.start.node, child.start.backward);
            for side in self.graph.sides_of(start_outer) {
                if let Some(edge) = self.graph.get_edge(start_outer, side) {
                    site.edges.insert(edge);
                }
            }

            let end_outer = NodeSide::new(child.end.node, !child.end.backward);
            for side in self.graph.sides_of(end_outer) {
                if let Some(edge) = self.graph.get_edge(end_outer, side) {
                    site.edges.insert(edge);
                }
            }
        }

        // finally the inner sides of this site's own anchors
        let start_inner = NodeSide::new(site.start.node, !site.start.backward);
        for side in self.graph.sides_of(start_inner) {
            if let Some(edge) = self.graph.get_edge(start_inner, side) {
                site.edges.insert(edge);
            }
        }

        let end_inner = NodeSide::new(site.end.node, site.end.backward);
        for side in self.graph.sides_of(end_inner) {
            if let Some(edge) = self.graph.get_edge(end_inner, side) {
                site.edges.insert(edge);
            }
        }

        site
    }
}

/// The bubble tree for [`crate::graph::mock::create_nested_sites_graph`]:
/// an outer bubble from 1 to 6 containing an inner one from 2 to 5.
#[cfg(test)]
pub(crate) fn nested_sites_tree() -> BubbleTree {
    let mut tree = BubbleTree::new();
    let outer = tree.add_bubble(BubbleTree::ROOT, Bubble {
        start: NodeSide::new(1, true),
        end: NodeSide::new(6, false),
        contents: vec![1, 6],
    });
    tree.add_bubble(outer, Bubble {
        start: NodeSide::new(2, true),
        end: NodeSide::new(5, false),
        contents: vec![2, 3, 4, 5],
    });

    tree
}
