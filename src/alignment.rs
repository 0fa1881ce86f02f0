//! The alignment data model: a read aligned to a walk through the graph as a
//! sequence of per-node mappings, each carrying edit operations.

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;

/// A position on a node: an offset into its sequence in the given orientation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub node_id: NodeId,
    pub offset: usize,
    pub is_reverse: bool,
}

/// A single edit operation.
///
/// A match has `from_length == to_length` and an empty sequence; a
/// SNP/mismatch has equal lengths and carries the read bases; a deletion has
/// `to_length == 0`; an insertion or soft clip has `from_length == 0` and a
/// non-empty sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub from_length: usize,
    pub to_length: usize,
    pub sequence: String,
}

impl Edit {
    pub fn matching(length: usize) -> Self {
        Edit { from_length: length, to_length: length, sequence: String::new() }
    }

    #[inline]
    pub fn is_match(&self) -> bool {
        self.from_length == self.to_length && self.sequence.is_empty()
    }
}

/// The alignment of a read segment to one node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub position: Position,
    /// 1-based position of this mapping within its path.
    pub rank: usize,
    pub edits: Vec<Edit>,
}

impl Mapping {
    /// Graph bases consumed by this mapping.
    pub fn from_length(&self) -> usize {
        self.edits.iter().map(|e| e.from_length).sum()
    }

    /// Read bases consumed by this mapping.
    pub fn to_length(&self) -> usize {
        self.edits.iter().map(|e| e.to_length).sum()
    }
}

/// An ordered walk of mappings through the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    pub mappings: Vec<Mapping>,
}

/// A read together with its (possibly empty) alignment to the graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub sequence: String,
    /// Per-base qualities; empty when the read has none.
    pub quality: Vec<u8>,
    pub path: Path,
    pub score: i32,
    /// Fraction of read bases covered by perfect-match edits.
    pub identity: f64,
    pub mapping_quality: i32,
}

impl Alignment {
    pub fn from_sequence(sequence: impl Into<String>) -> Self {
        Alignment { sequence: sequence.into(), ..Default::default() }
    }

    pub fn clear_path(&mut self) {
        self.path.mappings.clear();
        self.score = 0;
        self.identity = 0.0;
    }
}

/// Fraction of the read covered by perfect matches, in `[0, 1]`.
pub fn identity(path: &Path, read_length: usize) -> f64 {
    if read_length == 0 {
        return 0.0;
    }

    let matched: usize = path.mappings.iter()
        .flat_map(|m| m.edits.iter())
        .filter(|e| e.is_match())
        .map(|e| e.to_length)
        .sum();

    matched as f64 / read_length as f64
}
