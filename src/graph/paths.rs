//! Embedded named paths with per-node mapping lookup and left/right cursors.

use rustc_hash::FxHashMap;

use serde::{Deserialize, Serialize};

use crate::errors::VargraphError;
use crate::graph::NodeId;

/// One step of an embedded path: a node visited in a chosen orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMapping {
    pub node_id: NodeId,
    pub is_reverse: bool,
}

/// A cursor into an embedded path, usable with [`Paths::traverse_left`] and
/// [`Paths::traverse_right`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PathStep {
    path: usize,
    index: usize,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PathData {
    name: String,
    mappings: Vec<PathMapping>,
}

/// The set of named paths embedded in a graph.
///
/// Besides the paths themselves, an index from node ID to the steps of every
/// path that visits the node is maintained, so that traversal finders can
/// start walks from arbitrary node visits.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Paths {
    paths: Vec<PathData>,
    path_index: FxHashMap<String, usize>,

    #[serde(skip)]
    node_mapping: FxHashMap<NodeId, FxHashMap<String, Vec<PathStep>>>,
}

impl Paths {
    pub fn create_path(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.path_index.contains_key(&name) {
            return;
        }

        self.path_index.insert(name.clone(), self.paths.len());
        self.paths.push(PathData { name, mappings: Vec::new() });
    }

    /// Append a mapping to the end of an existing path.
    pub fn append_mapping(
        &mut self,
        name: &str,
        node_id: NodeId,
        is_reverse: bool,
    ) -> Result<(), VargraphError> {
        let path = *self.path_index.get(name)
            .ok_or_else(|| VargraphError::UnknownPath(name.to_string()))?;

        let index = self.paths[path].mappings.len();
        self.paths[path].mappings.push(PathMapping { node_id, is_reverse });

        self.node_mapping
            .entry(node_id)
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(PathStep { path, index });

        Ok(())
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Does any embedded path visit this node?
    pub fn has_node_mapping(&self, node_id: NodeId) -> bool {
        self.node_mapping.get(&node_id).is_some_and(|m| !m.is_empty())
    }

    /// All steps visiting a node, grouped by path name.
    pub fn get_node_mapping(&self, node_id: NodeId) -> FxHashMap<String, Vec<PathStep>> {
        self.node_mapping.get(&node_id).cloned().unwrap_or_default()
    }

    #[inline]
    pub fn mapping(&self, step: PathStep) -> &PathMapping {
        &self.paths[step.path].mappings[step.index]
    }

    #[inline]
    pub fn path_name(&self, step: PathStep) -> &str {
        &self.paths[step.path].name
    }

    /// The previous step on the same path, or `None` at the beginning.
    pub fn traverse_left(&self, step: PathStep) -> Option<PathStep> {
        (step.index > 0).then(|| PathStep { path: step.path, index: step.index - 1 })
    }

    /// The next step on the same path, or `None` at the end.
    pub fn traverse_right(&self, step: PathStep) -> Option<PathStep> {
        (step.index + 1 < self.paths[step.path].mappings.len())
            .then(|| PathStep { path: step.path, index: step.index + 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_cursors() {
        let mut paths = Paths::default();
        paths.create_path("ref");
        for node in [1u64, 2, 4] {
            paths.append_mapping("ref", node, false).unwrap();
        }

        assert!(paths.has_node_mapping(2));
        assert!(!paths.has_node_mapping(3));

        let steps = paths.get_node_mapping(2);
        let step = steps["ref"][0];
        assert_eq!(paths.mapping(step).node_id, 2);

        let right = paths.traverse_right(step).unwrap();
        assert_eq!(paths.mapping(right).node_id, 4);
        assert!(paths.traverse_right(right).is_none());

        let left = paths.traverse_left(step).unwrap();
        assert_eq!(paths.mapping(left).node_id, 1);
        assert!(paths.traverse_left(left).is_none());
    }

    #[test]
    fn test_unknown_path_rejected() {
        let mut paths = Paths::default();
        assert!(paths.append_mapping("missing", 1, false).is_err());
    }
}
