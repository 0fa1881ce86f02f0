//! Banded global alignment over the whole graph, for reads whose length is
//! close to the graph length.
//!
//! The band for a node column is centered on the shortest and longest
//! source-to-column path lengths, padded by `band_padding` rows. With
//! permissive banding the padding is widened until the global corner cells
//! (read start at the sources, read end at the sinks) are inside the band.

use tracing::debug;

use crate::aligner::dp::{AlignState, Cell, DpGraph, FillMode, GraphDp, GraphMapping, NEG_INF};

/// Shortest and longest walk length from any source to each node's start.
fn topological_offsets(graph: &DpGraph) -> Vec<(usize, usize)> {
    let mut offsets = vec![(0usize, 0usize); graph.nodes.len()];
    for v in 0..graph.nodes.len() {
        let preds = &graph.nodes[v].preds;
        if preds.is_empty() {
            continue;
        }

        offsets[v] = preds.iter()
            .map(|&p| {
                let len = graph.nodes[p].seq.len();
                (offsets[p].0 + len, offsets[p].1 + len)
            })
            .fold((usize::MAX, 0), |(lo, hi), (plo, phi)| (lo.min(plo), hi.max(phi)));
    }

    offsets
}

/// Fill banded global matrices and trace back up to `max_alt` alignments in
/// descending score, starting from the best-scoring sink cells.
pub(crate) fn align_global_banded_core(
    graph: &DpGraph,
    read_nts: Vec<u8>,
    profile: &[[i32; 5]],
    gap_open: i32,
    gap_extend: i32,
    band_padding: usize,
    permissive_banding: bool,
    max_alt: usize,
) -> Vec<GraphMapping> {
    let m = profile.len();
    let offsets = topological_offsets(graph);

    let mut padding = band_padding;
    if permissive_banding {
        // widen until every sink's final column can hold read row m
        for s in graph.sinks() {
            let (min_off, max_off) = offsets[s];
            let len = graph.nodes[s].seq.len();
            let shortest = min_off + len;
            let longest = max_off + len;
            padding = padding
                .max(m.saturating_sub(longest))
                .max(shortest.saturating_sub(m));
        }
    }
    debug!(band_padding, padding, read_len = m, "banded global fill");

    let mut dp = GraphDp::new(
        graph,
        read_nts,
        profile,
        gap_open,
        gap_extend,
        0,
        FillMode::Global,
        Some((offsets, padding)),
    );
    dp.fill();

    let starts: Vec<Cell> = graph.sinks()
        .map(|s| Cell {
            node: s,
            i: m,
            j: graph.nodes[s].seq.len() - 1,
            state: AlignState::Match,
        })
        .collect();

    if !starts.iter().any(|c| dp.cell_value(c) > NEG_INF / 2) {
        panic!(
            "error:[BandedGlobalAligner] band width {padding} cannot reach the end of the read; \
             use permissive banding or a larger band padding"
        );
    }

    dp.trace_back_global_multi(&starts, max_alt)
}
