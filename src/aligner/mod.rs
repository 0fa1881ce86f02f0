//! Sequence-to-graph alignment: local, pinned, and banded-global modes over
//! an affine gap scoring model, plus mapping-quality estimation.

pub mod scoring;
pub(crate) mod dp;
pub(crate) mod cigar;
pub(crate) mod banded;
pub(crate) mod mapqual;

use tracing::debug;

use crate::alignment::{Alignment, Edit, Mapping, Position};
use crate::aligner::banded::align_global_banded_core;
use crate::aligner::cigar::{graph_mapping_to_alignment, unreverse_graph_mapping};
use crate::aligner::dp::{DpGraph, FillMode, GraphDp};
use crate::aligner::mapqual::{
    maximum_mapping_quality_approx, maximum_mapping_quality_exact, phred_to_prob, prob_to_phred,
};
use crate::aligner::scoring::{create_nt_table, recover_log_base, QualAdjTable, Scoring, NUM_NTS};
use crate::graph::{Edge, VariationGraph};

/// Build the graph with every node sequence reversed and every edge flipped,
/// reducing left-pinned alignment to right-pinned alignment. Node IDs are
/// preserved; nodes are inserted in reverse order so the graph stays
/// topologically sorted.
fn reverse_graph(graph: &VariationGraph) -> VariationGraph {
    let mut reversed = VariationGraph::new();
    for i in (0..graph.node_count()).rev() {
        let node = graph.node(i);
        reversed.add_node(node.id, node.sequence.chars().rev().collect::<String>());
    }

    for edge in graph.edges() {
        // an edge leaving an end now enters a beginning and vice versa
        reversed.add_edge(Edge {
            from: edge.to,
            from_start: edge.to_end,
            to: edge.from,
            to_end: edge.from_start,
        }).expect("reversed edge endpoints exist");
    }

    reversed
}

/// Shared implementation of local and pinned alignment for the plain and
/// quality-adjusted aligners. The profile callback produces, per read
/// position, the substitution score against each of the five nucleotide
/// codes.
#[allow(clippy::too_many_arguments)]
fn align_internal(
    graph: &VariationGraph,
    nt_table: &[u8; 256],
    alignment: &mut Alignment,
    mut multi_alignments: Option<&mut Vec<Alignment>>,
    pinned: bool,
    pin_left: bool,
    max_alt_alns: usize,
    gap_open: i32,
    gap_extend: i32,
    full_length_bonus: i32,
    use_quality: bool,
    profile_fn: impl Fn(&[u8], &[u8]) -> Vec<[i32; NUM_NTS]>,
) {
    // check input integrity
    if pin_left && !pinned {
        panic!("error:[Aligner] cannot choose pinned end in non-pinned alignment");
    }
    if multi_alignments.is_some() && !pinned {
        panic!("error:[Aligner] multiple traceback is not implemented in local alignment, only pinned and global");
    }
    if multi_alignments.is_none() && max_alt_alns != 1 {
        panic!("error:[Aligner] cannot specify maximum number of alignments in single alignment");
    }

    // pinning is implemented against the bottom-right corner; left-pinning
    // reverses graph and read first and translates back afterwards
    let reversed_graph = pin_left.then(|| reverse_graph(graph));
    let align_graph = reversed_graph.as_ref().unwrap_or(graph);

    let mut align_sequence = alignment.sequence.clone().into_bytes();
    let mut align_quality = alignment.quality.clone();
    if pinned {
        if pin_left {
            align_sequence.reverse();
            align_quality.reverse();
        }

        // dummy ending that aligns to the dummy pinning node
        align_sequence.push(b'N');
        if use_quality {
            align_quality.push(0);
        }
    }

    if use_quality && align_quality.len() != align_sequence.len() {
        panic!("error:[Aligner] sequence and quality strings different lengths, cannot perform base quality adjusted alignment");
    }

    let read_nts: Vec<u8> = align_sequence.iter().map(|&b| nt_table[b as usize]).collect();
    let profile = profile_fn(&read_nts, &align_quality);

    let dp_graph = DpGraph::build(align_graph, nt_table, pinned);
    let mut dp = GraphDp::new(
        &dp_graph,
        read_nts,
        &profile,
        gap_open,
        gap_extend,
        full_length_bonus,
        FillMode::Local,
        None,
    );
    dp.fill();

    if pinned {
        let mut gms = dp.trace_back_pinned_multi(max_alt_alns);

        if pin_left {
            // translate mappings back into original node space
            for gm in &mut gms {
                unreverse_graph_mapping(gm, graph);
            }
        }

        if gms[0].score > 0 {
            graph_mapping_to_alignment(graph, &mut gms[0], alignment, pinned, pin_left);
        } else if graph.node_count() > 0 {
            // the DP will not identify mappings with zero score; infer the
            // location from the pin side and emit a pure soft clip
            alignment.clear_path();

            let (node, offset) = if pin_left {
                (graph.node(0), 0)
            } else {
                let node = graph.node(graph.node_count() - 1);
                (node, node.sequence.len())
            };
            alignment.path.mappings.push(Mapping {
                position: Position { node_id: node.id, offset, is_reverse: false },
                rank: 1,
                edits: vec![Edit {
                    from_length: 0,
                    to_length: alignment.sequence.len(),
                    sequence: alignment.sequence.clone(),
                }],
            });
        } else {
            alignment.clear_path();
        }

        if let Some(multi) = multi_alignments.as_deref_mut() {
            let num_non_null = gms.iter()
                .skip(1)
                .position(|gm| gm.score <= 0)
                .map_or(gms.len(), |p| p + 1);

            multi.reserve(num_non_null);
            multi.push(alignment.clone());

            for gm in &mut gms[1..num_non_null] {
                let mut next = Alignment::from_sequence(alignment.sequence.clone());
                next.quality = alignment.quality.clone();
                graph_mapping_to_alignment(graph, gm, &mut next, pinned, pin_left);
                multi.push(next);
            }
        }
    } else {
        let mut gm = dp.trace_back_local();
        graph_mapping_to_alignment(graph, &mut gm, alignment, pinned, pin_left);
    }
}

/// Shared banded-global entry for both aligners.
#[allow(clippy::too_many_arguments)]
fn align_global_banded_internal(
    graph: &VariationGraph,
    nt_table: &[u8; 256],
    alignment: &mut Alignment,
    mut multi_alignments: Option<&mut Vec<Alignment>>,
    max_alt_alns: usize,
    gap_open: i32,
    gap_extend: i32,
    band_padding: usize,
    permissive_banding: bool,
    profile_fn: impl Fn(&[u8], &[u8]) -> Vec<[i32; NUM_NTS]>,
) {
    if multi_alignments.is_none() && max_alt_alns != 1 {
        panic!("error:[Aligner] cannot specify maximum number of alignments in single alignment");
    }

    let read_nts: Vec<u8> = alignment.sequence.bytes().map(|b| nt_table[b as usize]).collect();
    let profile = profile_fn(&read_nts, &alignment.quality);

    let dp_graph = DpGraph::build(graph, nt_table, false);
    let mut gms = align_global_banded_core(
        &dp_graph,
        read_nts,
        &profile,
        gap_open,
        gap_extend,
        band_padding,
        permissive_banding,
        max_alt_alns,
    );

    graph_mapping_to_alignment(graph, &mut gms[0], alignment, false, false);

    if let Some(multi) = multi_alignments.as_deref_mut() {
        multi.reserve(gms.len());
        multi.push(alignment.clone());

        for gm in &mut gms[1..] {
            let mut next = Alignment::from_sequence(alignment.sequence.clone());
            next.quality = alignment.quality.clone();
            graph_mapping_to_alignment(graph, gm, &mut next, false, false);
            multi.push(next);
        }
    }
}

fn compute_mapping_quality_internal(
    log_base: f64,
    scaled_scores: &mut Vec<f64>,
    max_mapping_quality: i32,
    fast_approximation: bool,
    cluster_mq: f64,
    use_cluster_mq: bool,
) -> (i32, usize) {
    if log_base <= 0.0 {
        panic!("error:[Aligner] must call init_mapping_quality before computing mapping qualities");
    }

    let (mut mapping_quality, max_idx) = if fast_approximation {
        maximum_mapping_quality_approx(scaled_scores)
    } else {
        maximum_mapping_quality_exact(scaled_scores)
    };

    if mapping_quality > max_mapping_quality as f64 {
        mapping_quality = max_mapping_quality as f64;
    }

    if use_cluster_mq {
        mapping_quality = prob_to_phred(phred_to_prob(cluster_mq + mapping_quality).sqrt());
    }

    (mapping_quality.round() as i32, max_idx)
}

/// The plain (non-quality-adjusted) aligner.
pub struct Aligner {
    pub scoring: Scoring,
    nt_table: [u8; 256],
    matrix: [[i32; NUM_NTS]; NUM_NTS],
    log_base: f64,
}

impl Aligner {
    pub fn new(scoring: Scoring) -> Self {
        Aligner {
            scoring,
            nt_table: create_nt_table(),
            matrix: scoring.score_matrix(),
            log_base: 0.0,
        }
    }

    fn profile(&self, read_nts: &[u8]) -> Vec<[i32; NUM_NTS]> {
        read_nts.iter()
            .map(|&q| {
                let mut row = [0i32; NUM_NTS];
                for (r, entry) in row.iter_mut().enumerate() {
                    *entry = self.matrix[r][q as usize];
                }
                row
            })
            .collect()
    }

    /// Local (Smith-Waterman-like) alignment of the read to the graph.
    pub fn align(&self, alignment: &mut Alignment, graph: &VariationGraph) {
        align_internal(
            graph, &self.nt_table, alignment, None,
            false, false, 1,
            self.scoring.gap_open, self.scoring.gap_extend, 0,
            false, |nts, _| self.profile(nts),
        );
    }

    /// Alignment anchored at a source (left) or sink (right) of the graph.
    pub fn align_pinned(
        &self,
        alignment: &mut Alignment,
        graph: &VariationGraph,
        pin_left: bool,
        full_length_bonus: i32,
    ) {
        align_internal(
            graph, &self.nt_table, alignment, None,
            true, pin_left, 1,
            self.scoring.gap_open, self.scoring.gap_extend, full_length_bonus,
            false, |nts, _| self.profile(nts),
        );
    }

    /// Pinned alignment with up to `max_alt_alns` tracebacks in descending
    /// score order; the primary lands in `alignment`, the rest (primary
    /// included) in `alt_alignments`.
    pub fn align_pinned_multi(
        &self,
        alignment: &mut Alignment,
        alt_alignments: &mut Vec<Alignment>,
        graph: &VariationGraph,
        pin_left: bool,
        max_alt_alns: usize,
        full_length_bonus: i32,
    ) {
        if !alt_alignments.is_empty() {
            panic!("error:[Aligner::align_pinned_multi] output vector must be empty for pinned multi-aligning");
        }

        align_internal(
            graph, &self.nt_table, alignment, Some(alt_alignments),
            true, pin_left, max_alt_alns,
            self.scoring.gap_open, self.scoring.gap_extend, full_length_bonus,
            false, |nts, _| self.profile(nts),
        );
    }

    /// Banded global alignment of the whole read against the whole graph.
    pub fn align_global_banded(
        &self,
        alignment: &mut Alignment,
        graph: &VariationGraph,
        band_padding: usize,
        permissive_banding: bool,
    ) {
        align_global_banded_internal(
            graph, &self.nt_table, alignment, None, 1,
            self.scoring.gap_open, self.scoring.gap_extend,
            band_padding, permissive_banding,
            |nts, _| self.profile(nts),
        );
    }

    pub fn align_global_banded_multi(
        &self,
        alignment: &mut Alignment,
        alt_alignments: &mut Vec<Alignment>,
        graph: &VariationGraph,
        max_alt_alns: usize,
        band_padding: usize,
        permissive_banding: bool,
    ) {
        if !alt_alignments.is_empty() {
            panic!("error:[Aligner::align_global_banded_multi] output vector must be empty for multi-aligning");
        }

        align_global_banded_internal(
            graph, &self.nt_table, alignment, Some(alt_alignments), max_alt_alns,
            self.scoring.gap_open, self.scoring.gap_extend,
            band_padding, permissive_banding,
            |nts, _| self.profile(nts),
        );
    }

    pub fn score_exact_match(&self, sequence: &str) -> i32 {
        self.scoring.score_exact_match(sequence)
    }

    /// Recover the score-to-likelihood constant for the given GC content.
    /// Must be called before any mapping-quality computation.
    pub fn init_mapping_quality(&mut self, gc_content: f64) {
        self.log_base = recover_log_base(self.scoring.match_score, self.scoring.mismatch, gc_content, 1e-12);
        debug!(log_base = self.log_base, gc_content, "initialized mapping quality");
    }

    pub fn is_mapping_quality_initialized(&self) -> bool {
        self.log_base > 0.0
    }

    /// Compute the mapping quality of the best alignment in `alignments` and
    /// store it there, capped at `max_mapping_quality`.
    pub fn compute_mapping_quality(
        &self,
        alignments: &mut [Alignment],
        max_mapping_quality: i32,
        fast_approximation: bool,
        cluster_mq: f64,
        use_cluster_mq: bool,
    ) {
        if alignments.is_empty() {
            return;
        }

        let mut scaled_scores: Vec<f64> = alignments.iter()
            .map(|aln| self.log_base * aln.score as f64)
            .collect();
        let (mq, max_idx) = compute_mapping_quality_internal(
            self.log_base, &mut scaled_scores,
            max_mapping_quality, fast_approximation, cluster_mq, use_cluster_mq,
        );

        alignments[max_idx].mapping_quality = mq;
    }

    /// Paired-end variant over summed pair scores; both mates of the best
    /// pair receive the quality.
    pub fn compute_paired_mapping_quality(
        &self,
        alignment_pairs: &mut (Vec<Alignment>, Vec<Alignment>),
        max_mapping_quality: i32,
        fast_approximation: bool,
        cluster_mq: f64,
        use_cluster_mq: bool,
    ) {
        let size = alignment_pairs.0.len().min(alignment_pairs.1.len());
        if size == 0 {
            return;
        }

        let mut scaled_scores: Vec<f64> = (0..size)
            .map(|i| self.log_base * (alignment_pairs.0[i].score + alignment_pairs.1[i].score) as f64)
            .collect();
        let (mq, max_idx) = compute_mapping_quality_internal(
            self.log_base, &mut scaled_scores,
            max_mapping_quality, fast_approximation, cluster_mq, use_cluster_mq,
        );

        alignment_pairs.0[max_idx].mapping_quality = mq;
        alignment_pairs.1[max_idx].mapping_quality = mq;
    }
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(Scoring::default())
    }
}

/// The base-quality adjusted aligner: same alignment modes, but substitution
/// scores come from the 3-D quality table and gap parameters are scaled into
/// its dynamic range.
pub struct QualAdjAligner {
    pub scoring: Scoring,
    pub qual_table: QualAdjTable,
    nt_table: [u8; 256],
    log_base: f64,
}

impl QualAdjAligner {
    pub fn new(scoring: Scoring, max_scaled_score: i32, max_qual_score: u8, gc_content: f64) -> Self {
        let qual_table = QualAdjTable::new(max_scaled_score, max_qual_score, &scoring, gc_content, 1e-12);
        let mut aligner = QualAdjAligner {
            scoring,
            qual_table,
            nt_table: create_nt_table(),
            log_base: 0.0,
        };
        aligner.init_mapping_quality(gc_content);

        aligner
    }

    fn profile(&self, read_nts: &[u8], quality: &[u8]) -> Vec<[i32; NUM_NTS]> {
        read_nts.iter()
            .zip(quality)
            .map(|(&q, &qual)| {
                let mut row = [0i32; NUM_NTS];
                for (r, entry) in row.iter_mut().enumerate() {
                    *entry = self.qual_table.score(qual, r, q as usize);
                }
                row
            })
            .collect()
    }

    /// The gap-scaling factor applied to externally supplied score values
    /// such as the full-length bonus.
    fn scale(&self) -> i32 {
        self.qual_table.scaled_gap_open / self.scoring.gap_open
    }

    pub fn align(&self, alignment: &mut Alignment, graph: &VariationGraph) {
        align_internal(
            graph, &self.nt_table, alignment, None,
            false, false, 1,
            self.qual_table.scaled_gap_open, self.qual_table.scaled_gap_extend, 0,
            true, |nts, quals| self.profile(nts, quals),
        );
    }

    pub fn align_pinned(
        &self,
        alignment: &mut Alignment,
        graph: &VariationGraph,
        pin_left: bool,
        full_length_bonus: i32,
    ) {
        align_internal(
            graph, &self.nt_table, alignment, None,
            true, pin_left, 1,
            self.qual_table.scaled_gap_open, self.qual_table.scaled_gap_extend,
            full_length_bonus * self.scale(),
            true, |nts, quals| self.profile(nts, quals),
        );
    }

    pub fn align_pinned_multi(
        &self,
        alignment: &mut Alignment,
        alt_alignments: &mut Vec<Alignment>,
        graph: &VariationGraph,
        pin_left: bool,
        max_alt_alns: usize,
        full_length_bonus: i32,
    ) {
        if !alt_alignments.is_empty() {
            panic!("error:[Aligner::align_pinned_multi] output vector must be empty for pinned multi-aligning");
        }

        align_internal(
            graph, &self.nt_table, alignment, Some(alt_alignments),
            true, pin_left, max_alt_alns,
            self.qual_table.scaled_gap_open, self.qual_table.scaled_gap_extend,
            full_length_bonus * self.scale(),
            true, |nts, quals| self.profile(nts, quals),
        );
    }

    fn check_quality(&self, alignment: &Alignment) {
        if alignment.quality.len() != alignment.sequence.len() {
            panic!("error:[Aligner] sequence and quality strings different lengths, cannot perform base quality adjusted alignment");
        }
    }

    pub fn align_global_banded(
        &self,
        alignment: &mut Alignment,
        graph: &VariationGraph,
        band_padding: usize,
        permissive_banding: bool,
    ) {
        self.check_quality(alignment);
        align_global_banded_internal(
            graph, &self.nt_table, alignment, None, 1,
            self.qual_table.scaled_gap_open, self.qual_table.scaled_gap_extend,
            band_padding, permissive_banding,
            |nts, quals| self.profile(nts, quals),
        );
    }

    pub fn align_global_banded_multi(
        &self,
        alignment: &mut Alignment,
        alt_alignments: &mut Vec<Alignment>,
        graph: &VariationGraph,
        max_alt_alns: usize,
        band_padding: usize,
        permissive_banding: bool,
    ) {
        if !alt_alignments.is_empty() {
            panic!("error:[Aligner::align_global_banded_multi] output vector must be empty for multi-aligning");
        }
        self.check_quality(alignment);

        align_global_banded_internal(
            graph, &self.nt_table, alignment, Some(alt_alignments), max_alt_alns,
            self.qual_table.scaled_gap_open, self.qual_table.scaled_gap_extend,
            band_padding, permissive_banding,
            |nts, quals| self.profile(nts, quals),
        );
    }

    pub fn score_exact_match(&self, sequence: &str, base_quality: &[u8]) -> i32 {
        self.qual_table.score_exact_match(sequence, base_quality, &self.nt_table)
    }

    /// Like [`Aligner::init_mapping_quality`], with the log base rescaled to
    /// the adjusted matrix's dynamic range.
    pub fn init_mapping_quality(&mut self, gc_content: f64) {
        let log_base = recover_log_base(self.scoring.match_score, self.scoring.mismatch, gc_content, 1e-12);
        self.log_base = log_base / (self.qual_table.scaled_gap_open as f64 / self.scoring.gap_open as f64);
    }

    pub fn is_mapping_quality_initialized(&self) -> bool {
        self.log_base > 0.0
    }

    pub fn compute_mapping_quality(
        &self,
        alignments: &mut [Alignment],
        max_mapping_quality: i32,
        fast_approximation: bool,
        cluster_mq: f64,
        use_cluster_mq: bool,
    ) {
        if alignments.is_empty() {
            return;
        }

        let mut scaled_scores: Vec<f64> = alignments.iter()
            .map(|aln| self.log_base * aln.score as f64)
            .collect();
        let (mq, max_idx) = compute_mapping_quality_internal(
            self.log_base, &mut scaled_scores,
            max_mapping_quality, fast_approximation, cluster_mq, use_cluster_mq,
        );

        alignments[max_idx].mapping_quality = mq;
    }
}
