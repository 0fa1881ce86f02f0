//! Conversion of raw graph-cigar tracebacks into alignment paths, including
//! removal of the artifacts the synthetic pinning node leaves behind.

use std::fmt::{Display, Formatter};

use crate::alignment::{identity, Alignment, Edit, Mapping, Position};
use crate::aligner::dp::{CigarElement, GraphMapping};
use crate::graph::VariationGraph;

impl Display for GraphMapping {
    /// The compact `offset@node:cigar,node:cigar` form.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@", self.position)?;
        for (i, nc) in self.node_cigars.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}:", nc.node_id)?;
            for e in &nc.elements {
                write!(f, "{}{}", e.len, e.op as char)?;
            }
        }

        Ok(())
    }
}

/// Translate a traceback on the reversed graph back into forward-space
/// coordinates: node order and per-node runs are mirrored and the offset on
/// the (new) first node is recomputed from its aligned length.
pub(crate) fn unreverse_graph_mapping(gm: &mut GraphMapping, graph: &VariationGraph) {
    gm.node_cigars.reverse();
    for nc in &mut gm.node_cigars {
        nc.elements.reverse();
    }

    if let Some(first) = gm.node_cigars.first() {
        let num_ref_aligned: usize = first.elements.iter()
            .filter(|e| matches!(e.op, b'M' | b'X' | b'N' | b'D'))
            .map(|e| e.len as usize)
            .sum();
        // after a pinned traceback the first node is the dummy sink, which
        // the forward graph does not contain; it is fully aligned, so the
        // saturation yields its offset of zero
        let node_len = graph.get_node(first.node_id)
            .map_or(0, |n| n.sequence.len());
        gm.position = node_len.saturating_sub(num_ref_aligned);
    } else {
        gm.position = 0;
    }
}

/// Move deletions and insertions that the traceback recorded on the dummy
/// pinning node onto real nodes, so that dropping the dummy leaves a
/// well-formed cigar.
///
/// `start..end` is the range of real node cigars (the dummy sits just
/// outside it: at `start - 1` when left-pinned, at `end` otherwise).
fn fixup_pinned(gm: &mut GraphMapping, pin_left: bool, start: usize, end: usize) {
    if pin_left {
        let dummy_last_is_del = gm.node_cigars[start - 1].elements.last()
            .is_some_and(|e| e.op == b'D');
        let dummy_first = gm.node_cigars[start - 1].elements.first().copied();

        if dummy_last_is_del {
            if let Some(CigarElement { op: b'I', .. }) = dummy_first {
                // the insert must include the dummy N, so shorten it by one
                gm.node_cigars[start - 1].elements[0].len -= 1;
            } else {
                // migrate the deletion to where the dummy N-match landed
                let mut deletion_swapped = false;
                'outer: for i in start..end {
                    let cigar = &mut gm.node_cigars[i].elements;
                    for j in 0..cigar.len() {
                        match cigar[j].op {
                            b'N' | b'I' => {
                                if j > 0 {
                                    // the preceding element is a deletion
                                    // (anything else is fatal below)
                                    cigar[j - 1].len += 1;
                                    if cigar[j].len > 1 {
                                        cigar[j].len -= 1;
                                    } else {
                                        cigar.remove(j);
                                    }
                                } else if cigar[j].len == 1 && cigar[j].op == b'N' {
                                    cigar[j].op = b'D';
                                } else if cigar[j].len == 1 && cigar[j].op == b'I' {
                                    // a length-1 deletion and insertion cancel
                                    cigar.remove(j);
                                } else {
                                    cigar[j].len -= 1;
                                    cigar.insert(0, CigarElement { op: b'D', len: 1 });
                                }

                                deletion_swapped = true;
                                break 'outer;
                            }
                            b'D' => {}
                            _ => panic!(
                                "error:[Aligner] pinned alignment took a true match before the dummy pinning N-match"
                            ),
                        }
                    }
                }

                assert!(deletion_swapped);
            }
        }

        if let Some(CigarElement { op: b'I', len }) = gm.node_cigars[start - 1].elements.first().copied() {
            if start < end && len > 0 {
                gm.node_cigars[start].elements.insert(0, CigarElement { op: b'I', len });
            }
        }
    } else {
        // the same routine with indices mirrored for right-pinning
        let dummy_first_is_del = gm.node_cigars[end].elements.first()
            .is_some_and(|e| e.op == b'D');
        let dummy_last = gm.node_cigars[end].elements.last().copied();

        if dummy_first_is_del {
            if let Some(CigarElement { op: b'I', .. }) = dummy_last {
                let last = gm.node_cigars[end].elements.len() - 1;
                gm.node_cigars[end].elements[last].len -= 1;
            } else {
                let mut deletion_swapped = false;
                'outer: for i in (start..end).rev() {
                    let cigar = &mut gm.node_cigars[i].elements;
                    for j in (0..cigar.len()).rev() {
                        match cigar[j].op {
                            b'N' | b'I' => {
                                if j < cigar.len() - 1 {
                                    cigar[j + 1].len += 1;
                                    if cigar[j].len > 1 {
                                        cigar[j].len -= 1;
                                    } else {
                                        cigar.remove(j);
                                    }
                                } else if cigar[j].len == 1 && cigar[j].op == b'N' {
                                    cigar[j].op = b'D';
                                } else if cigar[j].len == 1 && cigar[j].op == b'I' {
                                    cigar.remove(j);
                                } else {
                                    cigar[j].len -= 1;
                                    cigar.push(CigarElement { op: b'D', len: 1 });
                                }

                                deletion_swapped = true;
                                break 'outer;
                            }
                            b'D' => {}
                            _ => panic!(
                                "error:[Aligner] pinned alignment took a true match before the dummy N-match"
                            ),
                        }
                    }
                }

                assert!(deletion_swapped);
            }
        }

        if let Some(CigarElement { op: b'I', len }) = gm.node_cigars[end].elements.last().copied() {
            if start < end && len > 0 {
                gm.node_cigars[end - 1].elements.push(CigarElement { op: b'I', len });
            }
        }
    }
}

/// Convert a raw traceback into the alignment's path: one mapping per
/// visited node, cigar runs translated into edits, the dummy pinning node
/// (if any) fixed up and dropped.
pub(crate) fn graph_mapping_to_alignment(
    graph: &VariationGraph,
    gm: &mut GraphMapping,
    alignment: &mut Alignment,
    pinned: bool,
    pin_left: bool,
) {
    alignment.clear_path();
    alignment.score = gm.score;

    let mut start = 0;
    let mut end = gm.node_cigars.len();
    if pinned {
        // the dummy node's cigar sits at one end; fix its artifacts up and
        // exclude it from conversion
        if pin_left {
            start += 1;
        } else {
            end -= 1;
        }
        fixup_pinned(gm, pin_left, start, end);
    }

    let to_seq = alignment.sequence.clone();
    let mut to_pos = 0usize;
    let mut from_pos = gm.position;

    for i in start..end {
        let nc = &gm.node_cigars[i];
        if nc.elements.is_empty() {
            continue;
        }

        let from_seq = &graph.get_node(nc.node_id)
            .unwrap_or_else(|| panic!("error:[Aligner] traceback visited unknown node {}", nc.node_id))
            .sequence;

        if i > start {
            // reset for each node after the first
            from_pos = 0;
        }

        let mut mapping = Mapping {
            position: Position { node_id: nc.node_id, offset: from_pos, is_reverse: false },
            rank: alignment.path.mappings.len() + 1,
            edits: Vec::new(),
        };

        for e in &nc.elements {
            let length = e.len as usize;
            match e.op {
                b'M' | b'X' | b'N' => {
                    // scan the aligned segments and emit runs of matches
                    // interleaved with per-base SNP edits
                    let mut last_start = from_pos;
                    let mut k = to_pos;
                    for h in from_pos..from_pos + length {
                        if from_seq.as_bytes()[h] != to_seq.as_bytes()[k] {
                            if h > last_start {
                                mapping.edits.push(Edit::matching(h - last_start));
                            }
                            mapping.edits.push(Edit {
                                from_length: 1,
                                to_length: 1,
                                sequence: to_seq[k..k + 1].to_string(),
                            });
                            last_start = h + 1;
                        }
                        k += 1;
                    }
                    if from_pos + length > last_start {
                        mapping.edits.push(Edit::matching(from_pos + length - last_start));
                    }
                    to_pos += length;
                    from_pos += length;
                }
                b'D' => {
                    mapping.edits.push(Edit {
                        from_length: length,
                        to_length: 0,
                        sequence: String::new(),
                    });
                    from_pos += length;
                }
                b'I' | b'S' => {
                    // soft clips and insertions are semantically equivalent
                    // and differ only by their position in the read
                    mapping.edits.push(Edit {
                        from_length: 0,
                        to_length: length,
                        sequence: to_seq[to_pos..to_pos + length].to_string(),
                    });
                    to_pos += length;
                }
                other => panic!(
                    "error:[Aligner] unsupported cigar op type {}",
                    other as char
                ),
            }
        }

        alignment.path.mappings.push(mapping);
    }

    alignment.identity = identity(&alignment.path, alignment.sequence.len());
}

#[cfg(test)]
mod tests {
    use smallvec::smallvec;

    use super::*;
    use crate::aligner::dp::{NodeCigar, PINNING_NODE_ID};

    fn cigar(node_id: u64, elements: &[(u8, u32)]) -> NodeCigar {
        NodeCigar {
            node_id,
            elements: elements.iter().map(|&(op, len)| CigarElement { op, len }).collect(),
        }
    }

    #[test]
    fn test_right_pin_deletion_migrates() {
        // the dummy N was deleted; the N-match on the real node absorbs it
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 3), (b'N', 1)]),
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);

        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'M', len: 3 },
            CigarElement { op: b'D', len: 1 },
        ]);
    }

    #[test]
    fn test_right_pin_deletion_shortens_n_run() {
        // the N-run at the node end loses one unit and the deletion lands
        // after it, adjacent to where the dummy node was
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 2), (b'D', 2), (b'N', 2)]),
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);

        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'M', len: 2 },
            CigarElement { op: b'D', len: 2 },
            CigarElement { op: b'N', len: 1 },
            CigarElement { op: b'D', len: 1 },
        ]);
    }

    #[test]
    fn test_right_pin_deletion_merges_into_following_run() {
        // a deletion sits between the N-match and the dummy; it absorbs the
        // migrated unit
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 2), (b'N', 1), (b'D', 2)]),
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);

        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'M', len: 2 },
            CigarElement { op: b'D', len: 3 },
        ]);
    }

    #[test]
    fn test_right_pin_insertion_cancels_deletion() {
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 4), (b'I', 1)]),
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);

        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'M', len: 4 },
        ]);
    }

    #[test]
    fn test_right_pin_trailing_insert_moves_to_real_node() {
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 4)]),
                cigar(PINNING_NODE_ID, &[(b'N', 1), (b'I', 2)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);

        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'M', len: 4 },
            CigarElement { op: b'I', len: 2 },
        ]);
    }

    #[test]
    #[should_panic(expected = "true match before the dummy")]
    fn test_right_pin_true_match_is_fatal() {
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(1, &[(b'M', 4)]),
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
            ],
        };

        fixup_pinned(&mut gm, false, 0, 1);
    }

    #[test]
    fn test_left_pin_mirror() {
        let mut gm = GraphMapping {
            position: 0,
            score: 5,
            node_cigars: vec![
                cigar(PINNING_NODE_ID, &[(b'D', 1)]),
                cigar(1, &[(b'N', 1), (b'M', 3)]),
            ],
        };

        fixup_pinned(&mut gm, true, 1, 2);

        assert_eq!(gm.node_cigars[1].elements.as_slice(), &[
            CigarElement { op: b'D', len: 1 },
            CigarElement { op: b'M', len: 3 },
        ]);
    }

    #[test]
    fn test_unreverse_graph_mapping() {
        let mut graph = VariationGraph::new();
        graph.add_node(1, "ACGTAC");
        graph.add_node(2, "GT");
        graph.add_edge(crate::graph::Edge::simple(1, 2)).unwrap();

        // a traceback on the reversed graph: node 2 first
        let mut gm = GraphMapping {
            position: 0,
            score: 6,
            node_cigars: vec![
                cigar(2, &[(b'M', 2)]),
                cigar(1, &[(b'M', 4), (b'S', 1)]),
            ],
        };

        unreverse_graph_mapping(&mut gm, &graph);

        assert_eq!(gm.node_cigars[0].node_id, 1);
        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[
            CigarElement { op: b'S', len: 1 },
            CigarElement { op: b'M', len: 4 },
        ]);
        // 4 of node 1's 6 bases are aligned, so the mapping starts at 2
        assert_eq!(gm.position, 2);
    }

    #[test]
    fn test_mapping_to_alignment_snp() {
        let mut graph = VariationGraph::new();
        graph.add_node(1, "ACGTACG");

        let mut gm = GraphMapping {
            position: 1,
            score: 2,
            node_cigars: vec![cigar(1, &[(b'M', 5)])],
        };

        // read differs from CGTAC at its middle base
        let mut alignment = Alignment::from_sequence("CGAAC");
        graph_mapping_to_alignment(&graph, &mut gm, &mut alignment, false, false);

        let mapping = &alignment.path.mappings[0];
        assert_eq!(mapping.position.node_id, 1);
        assert_eq!(mapping.position.offset, 1);
        assert_eq!(mapping.rank, 1);
        assert_eq!(mapping.edits, vec![
            Edit::matching(2),
            Edit { from_length: 1, to_length: 1, sequence: "A".into() },
            Edit::matching(2),
        ]);
        assert!((alignment.identity - 4.0 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_mapping_to_alignment_indels() {
        let mut graph = VariationGraph::new();
        graph.add_node(1, "ACGT");
        graph.add_node(2, "TTTT");
        graph.add_edge(crate::graph::Edge::simple(1, 2)).unwrap();

        let mut gm = GraphMapping {
            position: 0,
            score: 3,
            node_cigars: vec![
                cigar(1, &[(b'M', 4), (b'I', 2)]),
                cigar(2, &[(b'D', 1), (b'M', 3)]),
            ],
        };

        let mut alignment = Alignment::from_sequence("ACGTGGTTT");
        graph_mapping_to_alignment(&graph, &mut gm, &mut alignment, false, false);

        assert_eq!(alignment.path.mappings.len(), 2);
        let first = &alignment.path.mappings[0];
        assert_eq!(first.edits, vec![
            Edit::matching(4),
            Edit { from_length: 0, to_length: 2, sequence: "GG".into() },
        ]);
        let second = &alignment.path.mappings[1];
        assert_eq!(second.position.offset, 0);
        assert_eq!(second.rank, 2);
        assert_eq!(second.edits, vec![
            Edit { from_length: 1, to_length: 0, sequence: String::new() },
            Edit::matching(3),
        ]);

        // read length is conserved across the edits
        let to_len: usize = alignment.path.mappings.iter().map(|m| m.to_length()).sum();
        assert_eq!(to_len, alignment.sequence.len());
    }

    #[test]
    fn test_graph_cigar_display() {
        let gm = GraphMapping {
            position: 4,
            score: 3,
            node_cigars: vec![cigar(1, &[(b'S', 1), (b'M', 3)]), cigar(2, &[(b'M', 2)])],
        };

        assert_eq!(gm.to_string(), "4@1:1S3M,2:2M");
    }

    #[test]
    fn test_empty_node_cigar_skipped() {
        let mut graph = VariationGraph::new();
        graph.add_node(1, "AC");

        let mut gm = GraphMapping {
            position: 0,
            score: 2,
            node_cigars: vec![
                NodeCigar { node_id: 1, elements: smallvec![] },
                cigar(1, &[(b'M', 2)]),
            ],
        };

        let mut alignment = Alignment::from_sequence("AC");
        graph_mapping_to_alignment(&graph, &mut gm, &mut alignment, false, false);

        assert_eq!(alignment.path.mappings.len(), 1);
    }
}
