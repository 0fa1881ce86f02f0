//! Enumeration of the walks that span a nested site: a trivial BFS finder, an
//! exhaustive DFS finder, and a finder restricted to walks supported by
//! embedded reads and named paths.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::graph::{reverse_complement, NodeTraversal, VariationGraph};
use crate::sites::{NestedSite, SiteTraversal, Visit};

/// A strategy producing the traversals that span a site.
pub trait TraversalFinder {
    fn find_traversals(&self, site: &NestedSite) -> Vec<SiteTraversal>;
}

/// Maps from each child's entry traversal, and from its reversed exit
/// traversal, to the child index: these let the finders skip over child
/// sites without entering them.
fn child_border_maps(
    site: &NestedSite,
) -> (FxHashMap<NodeTraversal, usize>, FxHashMap<NodeTraversal, usize>) {
    let mut starts = FxHashMap::default();
    let mut ends = FxHashMap::default();
    for (idx, child) in site.children.iter().enumerate() {
        starts.insert(child.start, idx);
        // reversed so we find the exit when entering from that direction
        ends.insert(child.end.reverse(), idx);
    }

    (starts, ends)
}

/// Finds a single spanning walk by breadth-first search; used when any path
/// through the site suffices.
pub struct TrivialTraversalFinder<'a> {
    graph: &'a VariationGraph,
}

impl<'a> TrivialTraversalFinder<'a> {
    pub fn new(graph: &'a VariationGraph) -> Self {
        TrivialTraversalFinder { graph }
    }
}

impl TraversalFinder for TrivialTraversalFinder<'_> {
    fn find_traversals(&self, site: &NestedSite) -> Vec<SiteTraversal> {
        let mut to_return = Vec::new();

        // for each reachable traversal, the traversal we got there from
        let mut previous: FxHashMap<NodeTraversal, NodeTraversal> = FxHashMap::default();

        let mut stack = vec![site.start];
        while let Some(here) = stack.pop() {
            if here == site.end {
                // trace the path back to the start of the site
                let mut visits = Vec::new();
                let mut current = here;
                loop {
                    visits.push(Visit::Node(current));
                    if current == site.start {
                        break;
                    }
                    current = previous[&current];
                }
                visits.reverse();

                to_return.push(SiteTraversal { visits });
                // one spanning path is enough
                break;
            }

            for next in self.graph.nodes_next(here) {
                if previous.contains_key(&next) {
                    continue;
                }
                if !site.nodes.contains(&next.node) {
                    // we would be leaving the site
                    continue;
                }

                previous.insert(next, here);
                stack.push(next);
            }
        }

        to_return
    }
}

/// DFS stack entry for the exhaustive finder: either a frontier traversal to
/// expand, or the marker that closes the frontier above it.
enum StackEntry {
    Expand(NodeTraversal),
    Pop,
}

/// Enumerates every walk from the site's start to its end, treating child
/// sites as atomic visits.
pub struct ExhaustiveTraversalFinder<'a> {
    graph: &'a VariationGraph,
}

impl<'a> ExhaustiveTraversalFinder<'a> {
    pub fn new(graph: &'a VariationGraph) -> Self {
        ExhaustiveTraversalFinder { graph }
    }
}

impl TraversalFinder for ExhaustiveTraversalFinder<'_> {
    fn find_traversals(&self, site: &NestedSite) -> Vec<SiteTraversal> {
        let mut to_return = Vec::new();

        let (child_site_starts, child_site_ends) = child_border_maps(site);

        // the walk of the DFS so far
        let mut path: Vec<Visit> = Vec::new();

        let mut stack = vec![StackEntry::Expand(site.start)];
        while let Some(entry) = stack.pop() {
            let node_traversal = match entry {
                StackEntry::Expand(t) => t,
                StackEntry::Pop => {
                    // all edges out of the path head are done
                    path.pop();
                    continue;
                }
            };

            if node_traversal == site.end {
                // a full traversal of the site
                path.push(Visit::Node(node_traversal));
                to_return.push(SiteTraversal { visits: path.clone() });
                path.pop();
                continue;
            }

            // mark where this frontier's expansions begin
            stack.push(StackEntry::Pop);

            let visit;
            if let Some(&child) = child_site_starts.get(&node_traversal) {
                visit = Visit::Child { child, backward: false };
                // skip the child's interior entirely
                stack.push(StackEntry::Expand(site.children[child].end));
            } else if let Some(&child) = child_site_ends.get(&node_traversal) {
                visit = Visit::Child { child, backward: true };
                // traveling through the child backwards, so continue from
                // its reversed entry
                stack.push(StackEntry::Expand(site.children[child].start.reverse()));
            } else {
                visit = Visit::Node(node_traversal);
                for next in self.graph.nodes_next(node_traversal) {
                    stack.push(StackEntry::Expand(next));
                }
            }

            path.push(visit);
        }

        debug!(traversals = to_return.len(), "exhaustive site enumeration");

        to_return
    }
}

/// Enumerates only the walks supported by embedded paths, pruning those seen
/// fewer than `min_recurrence` times. Reads contribute one observation each;
/// named non-read paths (such as the reference) count as `min_recurrence` so
/// their alleles always survive.
pub struct ReadRestrictedTraversalFinder<'a> {
    graph: &'a VariationGraph,
    read_names: FxHashSet<String>,
    min_recurrence: usize,
    max_path_search_steps: usize,
}

impl<'a> ReadRestrictedTraversalFinder<'a> {
    pub fn new(
        graph: &'a VariationGraph,
        read_names: FxHashSet<String>,
        min_recurrence: usize,
        max_path_search_steps: usize,
    ) -> Self {
        ReadRestrictedTraversalFinder { graph, read_names, min_recurrence, max_path_search_steps }
    }
}

impl TraversalFinder for ReadRestrictedTraversalFinder<'_> {
    fn find_traversals(&self, site: &NestedSite) -> Vec<SiteTraversal> {
        // deduplicate subpaths by the allele sequence they spell out, with
        // occurrence counts; the ordered map keeps the output stable
        let mut results: BTreeMap<String, (Vec<Visit>, usize)> = BTreeMap::new();

        let (child_site_starts, child_site_ends) = child_border_maps(site);

        let paths = &self.graph.paths;
        if !paths.has_node_mapping(site.start.node) || !paths.has_node_mapping(site.end.node) {
            return Vec::new();
        }

        let endmappings_by_name = paths.get_node_mapping(site.end.node);

        // iterate paths in name order so dedup keeps a stable representative
        let startmappings_by_name: BTreeMap<String, _> =
            paths.get_node_mapping(site.start.node).into_iter().collect();

        for (name, steps) in startmappings_by_name {
            if !endmappings_by_name.contains_key(&name) {
                // no walk of this path can reach the end node
                continue;
            }
            let is_read = self.read_names.contains(&name);

            for &start_step in &steps {
                trace!(path = %name, "walking path through site");

                let mut traversal_count = 0usize;

                // walk left if the mapping and the site entry disagree on
                // orientation, right otherwise
                let traversal_direction =
                    paths.mapping(start_step).is_reverse != site.start.backward;
                // walking backward, the end node appears flipped
                let expected_end_orientation = site.end.backward != traversal_direction;

                let mut path_traversed: Vec<Visit> = Vec::new();
                let mut allele = String::new();

                let mut cursor = Some(start_step);
                while let Some(step) = cursor {
                    if traversal_count >= self.max_path_search_steps {
                        break;
                    }

                    let mapping = paths.mapping(step);
                    let node_traversal = NodeTraversal::new(
                        mapping.node_id,
                        mapping.is_reverse != traversal_direction,
                    );

                    let seq = &self.graph.get_node(node_traversal.node)
                        .expect("path mappings refer to graph nodes")
                        .sequence;
                    if node_traversal.backward {
                        allele.push_str(&reverse_complement(seq));
                    } else {
                        allele.push_str(seq);
                    }

                    if node_traversal.node == site.end.node
                        && node_traversal.backward == expected_end_orientation
                    {
                        // reached the end of the site in the right
                        // orientation
                        path_traversed.push(Visit::Node(node_traversal));

                        if results.contains_key(&allele) {
                            let (_, count) = results.get_mut(&allele).unwrap();
                            if is_read {
                                *count += 1;
                            } else if *count < self.min_recurrence {
                                // keep named-path alleles alive
                                *count = self.min_recurrence;
                            } else {
                                *count += 1;
                            }
                        } else {
                            let count = if is_read { 1 } else { self.min_recurrence };
                            results.insert(allele.clone(), (path_traversed.clone(), count));
                        }

                        break;
                    }

                    let mut visit = Visit::Node(node_traversal);

                    // is this traversal a boundary of a nested child site?
                    let mut site_opposite_side = None;
                    if let Some(&child) = child_site_starts.get(&node_traversal) {
                        site_opposite_side = Some(site.children[child].end.node);
                        visit = Visit::Child { child, backward: false };

                        // stand in for the whole child in the allele string
                        write!(
                            allele, "({}:{})",
                            site.children[child].start.node, site.children[child].end.node,
                        ).unwrap();
                    } else if let Some(&child) = child_site_ends.get(&node_traversal) {
                        site_opposite_side = Some(site.children[child].start.node);
                        visit = Visit::Child { child, backward: true };

                        write!(
                            allele, "({}:{})",
                            site.children[child].end.node, site.children[child].start.node,
                        ).unwrap();
                    }

                    path_traversed.push(visit);

                    if let Some(opposite) = site_opposite_side {
                        // fast-forward the cursor across the child
                        let mut current = step;
                        loop {
                            if paths.mapping(current).node_id == opposite {
                                break;
                            }
                            let next = if traversal_direction {
                                paths.traverse_left(current)
                            } else {
                                paths.traverse_right(current)
                            };
                            traversal_count += 1;
                            match next {
                                Some(n) => current = n,
                                None => break,
                            }
                        }

                        if paths.mapping(current).node_id == opposite {
                            cursor = Some(current);
                        } else {
                            // the path ended inside the child
                            cursor = None;
                        }
                    } else {
                        cursor = if traversal_direction {
                            paths.traverse_left(step)
                        } else {
                            paths.traverse_right(step)
                        };
                        traversal_count += 1;
                    }
                }
            }
        }

        // collect the surviving alleles
        let mut to_return = Vec::new();
        for (allele, (visits, count)) in results {
            if count < self.min_recurrence {
                // not enough support to justify keeping this allele
                trace!(allele = %allele, count, "pruned traversal");
                continue;
            }

            to_return.push(SiteTraversal { visits });
        }

        to_return
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::{create_nested_sites_graph, create_snp_bubble_graph};
    use crate::graph::{NodeSide, VariationGraph};
    use crate::sites::{nested_sites_tree, Bubble, BubbleTree, SiteFinder};

    fn snp_bubble_site(graph: &VariationGraph) -> NestedSite {
        let mut tree = BubbleTree::new();
        tree.add_bubble(BubbleTree::ROOT, Bubble {
            start: NodeSide::new(1, true),
            end: NodeSide::new(4, false),
            contents: vec![1, 2, 3, 4],
        });

        SiteFinder::new(graph).top_level_sites(&tree).remove(0)
    }

    /// Spell out the allele a traversal covers, child visits rendered as
    /// `(start:end)` tokens, anchor nodes omitted.
    fn allele_of(graph: &VariationGraph, site: &NestedSite, traversal: &SiteTraversal) -> String {
        let mut allele = String::new();
        for visit in &traversal.visits[1..traversal.visits.len() - 1] {
            match visit {
                Visit::Node(t) => {
                    let seq = &graph.get_node(t.node).unwrap().sequence;
                    if t.backward {
                        allele.push_str(&reverse_complement(seq));
                    } else {
                        allele.push_str(seq);
                    }
                }
                Visit::Child { child, backward } => {
                    let c = &site.children[*child];
                    if *backward {
                        write!(allele, "({}:{})", c.end.node, c.start.node).unwrap();
                    } else {
                        write!(allele, "({}:{})", c.start.node, c.end.node).unwrap();
                    }
                }
            }
        }

        allele
    }

    #[test]
    fn test_trivial_finder_finds_one_path() {
        let g = create_snp_bubble_graph();
        let site = snp_bubble_site(&g);

        let finder = TrivialTraversalFinder::new(&g);
        let traversals = finder.find_traversals(&site);

        assert_eq!(traversals.len(), 1);
        let visits = &traversals[0].visits;
        assert_eq!(visits.first(), Some(&Visit::Node(site.start)));
        assert_eq!(visits.last(), Some(&Visit::Node(site.end)));
        assert_eq!(visits.len(), 3);
    }

    #[test]
    fn test_exhaustive_finder_enumerates_both_alleles() {
        let g = create_snp_bubble_graph();
        let site = snp_bubble_site(&g);

        let finder = ExhaustiveTraversalFinder::new(&g);
        let traversals = finder.find_traversals(&site);

        assert_eq!(traversals.len(), 2);
        for t in &traversals {
            assert_eq!(t.visits.first(), Some(&Visit::Node(site.start)));
            assert_eq!(t.visits.last(), Some(&Visit::Node(site.end)));
        }

        let mut alleles: Vec<String> = traversals.iter()
            .map(|t| allele_of(&g, &site, t))
            .collect();
        alleles.sort();
        assert_eq!(alleles, vec!["GG".to_string(), "GT".to_string()]);
    }

    #[test]
    fn test_exhaustive_finder_skips_child_sites() {
        let g = create_nested_sites_graph();
        let finder = SiteFinder::new(&g);
        let outer = finder.top_level_sites(&nested_sites_tree()).remove(0);

        let traversals = ExhaustiveTraversalFinder::new(&g).find_traversals(&outer);

        // one walk through the child, one across the deletion edge; the
        // child contributes its token plus its exit anchor's base
        assert_eq!(traversals.len(), 2);
        let mut alleles: Vec<String> = traversals.iter()
            .map(|t| allele_of(&g, &outer, t))
            .collect();
        alleles.sort();
        assert_eq!(alleles, vec!["".to_string(), "(2:5)T".to_string()]);

        // the child is crossed as a single visit, never entered
        for t in &traversals {
            assert!(!t.visits.iter().any(|v| matches!(v, Visit::Node(t) if t.node == 3 || t.node == 4)));
        }
    }

    #[test]
    fn test_read_restricted_pruning() {
        let mut g = create_snp_bubble_graph();

        // the reference and one read support the GG allele; a single read
        // supports GT
        g.paths.create_path("ref");
        for node in [1u64, 2, 4] {
            g.paths.append_mapping("ref", node, false).unwrap();
        }
        g.paths.create_path("read1");
        for node in [1u64, 2, 4] {
            g.paths.append_mapping("read1", node, false).unwrap();
        }
        g.paths.create_path("read2");
        for node in [1u64, 3, 4] {
            g.paths.append_mapping("read2", node, false).unwrap();
        }

        let site = snp_bubble_site(&g);
        let read_names: FxHashSet<String> =
            ["read1".to_string(), "read2".to_string()].into_iter().collect();

        let finder = ReadRestrictedTraversalFinder::new(&g, read_names, 2, 100);
        let traversals = finder.find_traversals(&site);

        // GG survives (boosted by ref), GT is pruned
        assert_eq!(traversals.len(), 1);
        let allele = allele_of(&g, &site, &traversals[0]);
        assert_eq!(allele, "GG");
    }

    #[test]
    fn test_read_restricted_counts_reads() {
        let mut g = create_snp_bubble_graph();

        for name in ["read1", "read2"] {
            g.paths.create_path(name);
            for node in [1u64, 3, 4] {
                g.paths.append_mapping(name, node, false).unwrap();
            }
        }

        let site = snp_bubble_site(&g);
        let read_names: FxHashSet<String> =
            ["read1".to_string(), "read2".to_string()].into_iter().collect();

        let finder = ReadRestrictedTraversalFinder::new(&g, read_names, 2, 100);
        let traversals = finder.find_traversals(&site);

        // two reads reach min_recurrence together
        assert_eq!(traversals.len(), 1);
        assert_eq!(allele_of(&g, &site, &traversals[0]), "GT");
    }

    #[test]
    fn test_read_restricted_no_paths_is_empty() {
        let g = create_snp_bubble_graph();
        let site = snp_bubble_site(&g);

        let finder = ReadRestrictedTraversalFinder::new(&g, FxHashSet::default(), 1, 100);
        assert!(finder.find_traversals(&site).is_empty());
    }

    #[test]
    fn test_read_restricted_skips_children() {
        let mut g = create_nested_sites_graph();

        g.paths.create_path("ref");
        for node in [1u64, 2, 3, 5, 6] {
            g.paths.append_mapping("ref", node, false).unwrap();
        }

        let outer = SiteFinder::new(&g).top_level_sites(&nested_sites_tree()).remove(0);

        let finder = ReadRestrictedTraversalFinder::new(&g, FxHashSet::default(), 1, 100);
        let traversals = finder.find_traversals(&outer);

        assert_eq!(traversals.len(), 1);
        let visits = &traversals[0].visits;
        assert_eq!(visits[0], Visit::Node(outer.start));
        assert_eq!(visits[1], Visit::Child { child: 0, backward: false });
        assert_eq!(visits[2], Visit::Node(NodeTraversal::forward(5)));
        assert_eq!(visits.last(), Some(&Visit::Node(outer.end)));
    }

    #[test]
    fn test_read_restricted_step_budget() {
        let mut g = create_snp_bubble_graph();

        g.paths.create_path("ref");
        for node in [1u64, 2, 4] {
            g.paths.append_mapping("ref", node, false).unwrap();
        }

        let site = snp_bubble_site(&g);

        // a budget of one step cannot reach the end node
        let finder = ReadRestrictedTraversalFinder::new(&g, FxHashSet::default(), 1, 1);
        assert!(finder.find_traversals(&site).is_empty());
    }
}
