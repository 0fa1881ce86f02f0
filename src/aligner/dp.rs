//! The gap-affine dynamic-programming engine over a sequence graph.
//!
//! Per-node score matrices are filled in topological order; node boundaries
//! take the maximum over all predecessors' final columns. The same engine
//! backs local (Smith-Waterman-like) and pinned alignment directly, and the
//! banded global aligner reuses its matrices, traceback walker, and
//! alternate-traceback stack with a global fill.

use smallvec::{smallvec, SmallVec};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::graph::{NodeId, VariationGraph};
use crate::aligner::scoring::NT_N;

/// Node ID of the synthetic sink appended for pinned alignment.
pub(crate) const PINNING_NODE_ID: NodeId = NodeId::MAX;

/// Well below any reachable score, far enough from i32::MIN that gap
/// subtractions cannot wrap.
pub(crate) const NEG_INF: i32 = i32::MIN / 4;

/// One run of a node cigar. Ops are the gssw alphabet: `M` (match), `X`
/// (mismatch), `N` (match involving N), `I` (insertion), `D` (deletion),
/// `S` (soft clip).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CigarElement {
    pub op: u8,
    pub len: u32,
}

/// The cigar of one visited node.
#[derive(Clone, Debug)]
pub(crate) struct NodeCigar {
    pub node_id: NodeId,
    pub elements: SmallVec<[CigarElement; 4]>,
}

/// A raw traceback: per-node cigars in walk order, the offset of the first
/// aligned base on the first node, and the alignment score.
#[derive(Clone, Debug)]
pub(crate) struct GraphMapping {
    pub position: usize,
    pub score: i32,
    pub node_cigars: Vec<NodeCigar>,
}

/// A node of the DP-internal graph: normalized sequence plus walk
/// predecessors, in topological order.
pub(crate) struct DpNode {
    pub id: NodeId,
    pub seq: Vec<u8>,
    pub preds: Vec<usize>,
}

pub(crate) struct DpGraph {
    pub nodes: Vec<DpNode>,
    pub has_outgoing: Vec<bool>,
    pub dummy: Option<usize>,
}

impl DpGraph {
    /// Convert a variation graph into DP form. Doubly-reversed edges are
    /// flipped into walk orientation; a reversing edge is a fatal caller
    /// error. With `add_pinning_node`, a synthetic "N" sink is appended and
    /// wired from every node that had no outgoing walk edge.
    pub fn build(graph: &VariationGraph, nt_table: &[u8; 256], add_pinning_node: bool) -> Self {
        let order = graph.topological_sort()
            .unwrap_or_else(|err| panic!("error:[Aligner] {err}"));

        let index: FxHashMap<NodeId, usize> = order.iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();

        let mut nodes: Vec<DpNode> = order.iter()
            .map(|id| {
                let node = graph.get_node(*id).unwrap();
                DpNode {
                    id: *id,
                    seq: node.sequence.bytes().map(|b| nt_table[b as usize]).collect(),
                    preds: Vec::new(),
                }
            })
            .collect();

        let mut has_outgoing = vec![false; nodes.len()];
        for edge in graph.edges() {
            if !edge.from_start && !edge.to_end {
                // normal end-to-start edge
                let (u, v) = (index[&edge.from], index[&edge.to]);
                nodes[v].preds.push(u);
                has_outgoing[u] = true;
            } else if edge.from_start && edge.to_end {
                // doubly-reversed, walkable as to -> from
                let (u, v) = (index[&edge.to], index[&edge.from]);
                nodes[v].preds.push(u);
                has_outgoing[u] = true;
            } else {
                panic!(
                    "error:[Aligner] cannot align across reversing edge {} {} -> {} {}",
                    edge.from,
                    if edge.from_start { "start" } else { "end" },
                    edge.to,
                    if edge.to_end { "end" } else { "start" },
                );
            }
        }

        let dummy = if add_pinning_node {
            let preds: Vec<usize> = (0..nodes.len()).filter(|i| !has_outgoing[*i]).collect();
            nodes.push(DpNode { id: PINNING_NODE_ID, seq: vec![NT_N as u8], preds });
            has_outgoing.push(false);
            Some(nodes.len() - 1)
        } else {
            None
        };

        DpGraph { nodes, has_outgoing, dummy }
    }

    pub fn sinks(&self) -> impl Iterator<Item=usize> + '_ {
        (0..self.nodes.len()).filter(|i| !self.has_outgoing[*i])
    }
}

/// Per-node score matrices with `read_len + 1` rows. `h` is the combined
/// best, `e` the insertion (gap in graph) matrix, `f` the deletion matrix.
pub(crate) struct NodeMatrix {
    len: usize,
    h: Vec<i32>,
    e: Vec<i32>,
    f: Vec<i32>,
}

impl NodeMatrix {
    fn new(len: usize, rows: usize) -> Self {
        NodeMatrix {
            len,
            h: vec![NEG_INF; rows * len],
            e: vec![NEG_INF; rows * len],
            f: vec![NEG_INF; rows * len],
        }
    }

    #[inline]
    fn ix(&self, i: usize, j: usize) -> usize {
        i * self.len + j
    }
}

/// Whether the fill floors scores at zero (local/pinned) or seeds leading
/// gaps from a global origin.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum FillMode {
    Local,
    Global,
}

/// Which matrix a traceback cell lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AlignState {
    Match,
    Insertion,
    Deletion,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Cell {
    pub node: usize,
    pub i: usize,
    pub j: usize,
    pub state: AlignState,
}

/// A forced traceback decision: when the walker reaches `cell`, it takes
/// candidate `choice` instead of the best one.
#[derive(Clone, Debug)]
pub(crate) struct Deflection {
    cell: Cell,
    choice: usize,
}

/// Score-ordered stack of alternate tracebacks, each a start cell plus the
/// deflections that force it off the optimal path.
pub(crate) struct AltTracebackStack {
    max_alt: usize,
    min_score: i32,
    candidates: Vec<(i32, Cell, Vec<Deflection>)>,
}

impl AltTracebackStack {
    pub fn new(max_alt: usize, min_score: i32) -> Self {
        AltTracebackStack { max_alt, min_score, candidates: Vec::new() }
    }

    pub fn propose(&mut self, score: i32, start: Cell, deflections: Vec<Deflection>) {
        if score <= self.min_score {
            return;
        }
        if self.candidates.len() >= self.max_alt
            && score <= self.candidates.last().unwrap().0
        {
            return;
        }

        // insert after any equal score to keep enumeration stable
        let pos = self.candidates.partition_point(|(s, _, _)| *s >= score);
        self.candidates.insert(pos, (score, start, deflections));
        self.candidates.truncate(self.max_alt);
    }

    fn get(&self, k: usize) -> Option<(i32, Cell, Vec<Deflection>)> {
        self.candidates.get(k).cloned()
    }
}

/// One legal backward step out of a traceback cell. `val` is the incoming
/// score this step would have contributed; taking a step whose `val` is below
/// the cell value costs the difference. A step with no successor ends the
/// traceback, emitting `close_op` over the remaining read prefix.
struct Choice {
    val: i32,
    op: Option<(u8, u32)>,
    next: Option<Cell>,
    close_op: u8,
}

pub(crate) struct GraphDp<'a> {
    graph: &'a DpGraph,
    read_nts: Vec<u8>,
    profile: &'a [[i32; 5]],
    gap_open: i32,
    gap_extend: i32,
    full_length_bonus: i32,
    mode: FillMode,
    /// Per-node (min, max) topological base offset of the node start, used
    /// with `band_padding` to restrict fillable rows. `None` disables
    /// banding.
    band: Option<(Vec<(usize, usize)>, usize)>,
    matrices: Vec<NodeMatrix>,
    best_cell: Option<(i32, Cell)>,
}

impl<'a> GraphDp<'a> {
    pub fn new(
        graph: &'a DpGraph,
        read_nts: Vec<u8>,
        profile: &'a [[i32; 5]],
        gap_open: i32,
        gap_extend: i32,
        full_length_bonus: i32,
        mode: FillMode,
        band: Option<(Vec<(usize, usize)>, usize)>,
    ) -> Self {
        assert_eq!(read_nts.len(), profile.len());
        GraphDp {
            graph,
            read_nts,
            profile,
            gap_open,
            gap_extend,
            full_length_bonus,
            mode,
            band,
            matrices: Vec::new(),
            best_cell: None,
        }
    }

    #[inline]
    fn read_len(&self) -> usize {
        self.profile.len()
    }

    /// Substitution score for read row `i` (1-based) against column `j` of
    /// node `v`, including the full-length bonus on the first and last rows.
    #[inline]
    fn sub_score(&self, v: usize, i: usize, j: usize) -> i32 {
        let mut s = self.profile[i - 1][self.graph.nodes[v].seq[j] as usize];
        if i == 1 {
            s += self.full_length_bonus;
        }
        if i == self.read_len() {
            s += self.full_length_bonus;
        }

        s
    }

    /// Cigar op for the diagonal step at read row `i`, node column `j`.
    #[inline]
    fn diag_op(&self, v: usize, i: usize, j: usize) -> u8 {
        let r = self.graph.nodes[v].seq[j];
        let q = self.read_nts[i - 1];
        if r == NT_N as u8 || q == NT_N as u8 {
            b'N'
        } else if r == q {
            b'M'
        } else {
            b'X'
        }
    }

    /// Leading-gap score of the global origin: `i` read bases inserted
    /// before the graph.
    #[inline]
    fn origin_h(&self, i: usize) -> i32 {
        if i == 0 {
            0
        } else {
            -(self.gap_open + i as i32 * self.gap_extend)
        }
    }

    /// Fillable row range for column `j` of node `v` (inclusive).
    fn row_range(&self, v: usize, j: usize) -> (usize, usize) {
        let m = self.read_len();
        match &self.band {
            None => (0, m),
            Some((offsets, padding)) => {
                let (min_off, max_off) = offsets[v];
                let lo = (min_off + j + 1).saturating_sub(*padding);
                let hi = (max_off + j + 1 + padding).min(m);
                (lo.min(m), hi)
            }
        }
    }

    /// `(h, f)` values feeding the first column of node `v` at row `i`: the
    /// predecessors' final columns, or the global origin for a source node.
    fn boundary_prev(&self, v: usize, i: usize) -> SmallVec<[(i32, i32); 2]> {
        let preds = &self.graph.nodes[v].preds;
        if preds.is_empty() {
            return match self.mode {
                FillMode::Local => SmallVec::new(),
                FillMode::Global => smallvec![(self.origin_h(i), NEG_INF)],
            };
        }

        preds.iter()
            .map(|&p| {
                let mat = &self.matrices[p];
                let last = mat.len - 1;
                (mat.h[mat.ix(i, last)], mat.f[mat.ix(i, last)])
            })
            .collect()
    }

    pub fn fill(&mut self) {
        let m = self.read_len();
        let go_ge = self.gap_open + self.gap_extend;

        for v in 0..self.graph.nodes.len() {
            let len = self.graph.nodes[v].seq.len();
            let mut mat = NodeMatrix::new(len, m + 1);

            if self.mode == FillMode::Local {
                // a local alignment may start anywhere for free
                for j in 0..len {
                    let ix = mat.ix(0, j);
                    mat.h[ix] = 0;
                }
            }

            for j in 0..len {
                let (row_lo, row_hi) = self.row_range(v, j);
                for i in row_lo..=row_hi {
                    let prevs: SmallVec<[(i32, i32); 2]> = if j > 0 {
                        smallvec![(mat.h[mat.ix(i, j - 1)], mat.f[mat.ix(i, j - 1)])]
                    } else {
                        self.boundary_prev(v, i)
                    };

                    if i == 0 {
                        if self.mode == FillMode::Global {
                            // row 0 is reachable only by deleting graph bases
                            let f = prevs.iter()
                                .map(|&(h, f)| (h - go_ge).max(f - self.gap_extend))
                                .max()
                                .unwrap_or(NEG_INF);
                            let ix = mat.ix(0, j);
                            mat.f[ix] = f;
                            mat.h[ix] = f;
                        }
                        continue;
                    }

                    let ix = mat.ix(i, j);
                    let up = mat.ix(i - 1, j);

                    let e = (mat.h[up] - go_ge).max(mat.e[up] - self.gap_extend);

                    let f = prevs.iter()
                        .map(|&(h, f)| (h - go_ge).max(f - self.gap_extend))
                        .max()
                        .unwrap_or(NEG_INF);

                    let s = self.sub_score(v, i, j);
                    let diag_prevs: SmallVec<[(i32, i32); 2]> = if j > 0 {
                        smallvec![(mat.h[mat.ix(i - 1, j - 1)], NEG_INF)]
                    } else {
                        self.boundary_prev(v, i - 1)
                    };
                    let mut diag = diag_prevs.iter()
                        .map(|&(h, _)| h)
                        .max()
                        .unwrap_or(NEG_INF);
                    if self.mode == FillMode::Local {
                        // fresh start: nothing consumed before this cell
                        diag = diag.max(0);
                    }

                    let mut h = (diag.saturating_add(s)).max(e).max(f);
                    if self.mode == FillMode::Local {
                        h = h.max(0);
                    }

                    mat.e[ix] = e;
                    mat.f[ix] = f;
                    mat.h[ix] = h;

                    if self.best_cell.map_or(true, |(best, _)| h > best) {
                        self.best_cell = Some((h, Cell { node: v, i, j, state: AlignState::Match }));
                    }
                }
            }

            self.matrices.push(mat);
        }

        debug!(
            nodes = self.graph.nodes.len(),
            read_len = m,
            best = self.best_cell.map(|(s, _)| s),
            "filled DP matrices"
        );
    }

    pub fn best_cell(&self) -> Option<(i32, Cell)> {
        self.best_cell
    }

    pub fn cell_value(&self, cell: &Cell) -> i32 {
        let mat = &self.matrices[cell.node];
        let ix = mat.ix(cell.i, cell.j);
        match cell.state {
            AlignState::Match => mat.h[ix],
            AlignState::Insertion => mat.e[ix],
            AlignState::Deletion => mat.f[ix],
        }
    }

    /// Enumerate the backward steps out of `cell` in a fixed order, so that a
    /// candidate index identifies a choice deterministically.
    fn choices(&self, cell: &Cell) -> Vec<Choice> {
        let mut choices = Vec::new();
        let v = cell.node;
        let (i, j) = (cell.i, cell.j);
        let mat = &self.matrices[v];
        let go_ge = self.gap_open + self.gap_extend;
        let close_op = if self.mode == FillMode::Local { b'S' } else { b'I' };

        match cell.state {
            AlignState::Match => {
                if i > 0 {
                    // diagonal steps first: in-node, then predecessors in order
                    let s = self.sub_score(v, i, j);
                    let op = Some((self.diag_op(v, i, j), 1));
                    if j > 0 {
                        choices.push(Choice {
                            val: mat.h[mat.ix(i - 1, j - 1)].saturating_add(s),
                            op,
                            next: Some(Cell { node: v, i: i - 1, j: j - 1, state: AlignState::Match }),
                            close_op,
                        });
                    } else {
                        for &p in &self.graph.nodes[v].preds {
                            let pmat = &self.matrices[p];
                            let last = pmat.len - 1;
                            choices.push(Choice {
                                val: pmat.h[pmat.ix(i - 1, last)].saturating_add(s),
                                op,
                                next: Some(Cell { node: p, i: i - 1, j: last, state: AlignState::Match }),
                                close_op,
                            });
                        }
                        if self.graph.nodes[v].preds.is_empty() && self.mode == FillMode::Global {
                            choices.push(Choice {
                                val: self.origin_h(i - 1).saturating_add(s),
                                op,
                                next: None,
                                close_op,
                            });
                        }
                    }
                    if self.mode == FillMode::Local {
                        // fresh start consuming only this diagonal
                        choices.push(Choice { val: s, op, next: None, close_op });
                    }

                    choices.push(Choice {
                        val: mat.e[mat.ix(i, j)],
                        op: None,
                        next: Some(Cell { state: AlignState::Insertion, ..*cell }),
                        close_op,
                    });
                }
                choices.push(Choice {
                    val: mat.f[mat.ix(i, j)],
                    op: None,
                    next: Some(Cell { state: AlignState::Deletion, ..*cell }),
                    close_op,
                });
            }
            AlignState::Insertion => {
                // consume read base i as an insertion, then either keep
                // extending or close the gap
                let up = mat.ix(i - 1, j);
                choices.push(Choice {
                    val: mat.e[up] - self.gap_extend,
                    op: Some((b'I', 1)),
                    next: Some(Cell { node: v, i: i - 1, j, state: AlignState::Insertion }),
                    close_op,
                });
                choices.push(Choice {
                    val: mat.h[up] - go_ge,
                    op: Some((b'I', 1)),
                    next: Some(Cell { node: v, i: i - 1, j, state: AlignState::Match }),
                    close_op,
                });
            }
            AlignState::Deletion => {
                // consume column j as a deletion
                let op = Some((b'D', 1));
                if j > 0 {
                    let left = mat.ix(i, j - 1);
                    choices.push(Choice {
                        val: mat.f[left] - self.gap_extend,
                        op,
                        next: Some(Cell { node: v, i, j: j - 1, state: AlignState::Deletion }),
                        close_op,
                    });
                    choices.push(Choice {
                        val: mat.h[left] - go_ge,
                        op,
                        next: Some(Cell { node: v, i, j: j - 1, state: AlignState::Match }),
                        close_op,
                    });
                } else {
                    for &p in &self.graph.nodes[v].preds {
                        let pmat = &self.matrices[p];
                        let last = pmat.len - 1;
                        choices.push(Choice {
                            val: pmat.f[pmat.ix(i, last)] - self.gap_extend,
                            op,
                            next: Some(Cell { node: p, i, j: last, state: AlignState::Deletion }),
                            close_op,
                        });
                        choices.push(Choice {
                            val: pmat.h[pmat.ix(i, last)] - go_ge,
                            op,
                            next: Some(Cell { node: p, i, j: last, state: AlignState::Match }),
                            close_op,
                        });
                    }
                    if self.graph.nodes[v].preds.is_empty() && self.mode == FillMode::Global {
                        choices.push(Choice {
                            val: self.origin_h(i) - go_ge,
                            op,
                            next: None,
                            close_op,
                        });
                    }
                }
            }
        }

        choices
    }

    /// Walk one traceback from `start`, applying `deflections` in order.
    /// With a stack, every suboptimal branch observed after the deflections
    /// are exhausted is proposed as an alternate.
    pub fn trace_back(
        &self,
        start: Cell,
        score: i32,
        deflections: &[Deflection],
        mut stack: Option<&mut AltTracebackStack>,
    ) -> GraphMapping {
        // collected backward: (node index, op) pairs
        let mut rev_ops: Vec<(usize, u8)> = Vec::new();
        let mut cell = start;
        let mut pending = 0usize;
        let mut first_node = start.node;
        let mut first_col = start.j;
        let mut closed_with: Option<(u8, usize)> = None;

        loop {
            let value = self.cell_value(&cell);

            if self.mode == FillMode::Local && cell.state == AlignState::Match && value <= 0 {
                // the aligned region ends here; the rest of the read prefix
                // is soft-clipped
                if cell.i > 0 {
                    closed_with = Some((b'S', cell.i));
                }
                break;
            }

            let choices = self.choices(&cell);
            let pick = if pending < deflections.len() && deflections[pending].cell == cell {
                pending += 1;
                deflections[pending - 1].choice
            } else {
                let best = choices.iter()
                    .position(|c| c.val == value)
                    .unwrap_or_else(|| panic!("error:[Aligner] traceback dead end at {cell:?}"));

                if pending == deflections.len() {
                    if let Some(stack) = stack.as_deref_mut() {
                        for (ci, c) in choices.iter().enumerate() {
                            if ci != best && c.val > NEG_INF / 2 {
                                let mut defl = deflections.to_vec();
                                defl.push(Deflection { cell, choice: ci });
                                stack.propose(score - (value - c.val), start, defl);
                            }
                        }
                    }
                }

                best
            };

            let choice = &choices[pick];
            if let Some((op, len)) = choice.op {
                for _ in 0..len {
                    rev_ops.push((cell.node, op));
                }
                if op != b'I' {
                    first_node = cell.node;
                    first_col = cell.j;
                }
            }

            match choice.next {
                Some(next) => cell = next,
                None => {
                    // read prefix not consumed by the alignment proper
                    let remaining = match cell.state {
                        AlignState::Match => cell.i - 1,
                        AlignState::Insertion => cell.i - 1,
                        AlignState::Deletion => cell.i,
                    };
                    if remaining > 0 {
                        closed_with = Some((choice.close_op, remaining));
                    }
                    break;
                }
            }
        }

        // assemble per-node run-length cigars in walk order
        let mut node_cigars: Vec<NodeCigar> = Vec::new();
        for &(v, op) in rev_ops.iter().rev() {
            let id = self.graph.nodes[v].id;
            if node_cigars.last().map(|nc| nc.node_id) != Some(id) {
                node_cigars.push(NodeCigar { node_id: id, elements: SmallVec::new() });
            }
            let elements = &mut node_cigars.last_mut().unwrap().elements;
            match elements.last_mut() {
                Some(e) if e.op == op => e.len += 1,
                _ => elements.push(CigarElement { op, len: 1 }),
            }
        }

        if let Some((op, len)) = closed_with {
            let first_id = self.graph.nodes[first_node].id;
            if node_cigars.is_empty() {
                node_cigars.push(NodeCigar { node_id: first_id, elements: SmallVec::new() });
            }
            node_cigars[0].elements.insert(0, CigarElement { op, len: len as u32 });
        }

        // trailing soft clip for a local traceback that starts mid-read
        if self.mode == FillMode::Local && start.i < self.read_len() {
            let clip = (self.read_len() - start.i) as u32;
            if let Some(last) = node_cigars.last_mut() {
                last.elements.push(CigarElement { op: b'S', len: clip });
            }
        }

        trace!(score, nodes = node_cigars.len(), "traced back alignment");

        GraphMapping { position: first_col, score, node_cigars }
    }

    /// Local traceback from the best cell anywhere in the matrices.
    pub fn trace_back_local(&self) -> GraphMapping {
        match self.best_cell {
            Some((score, cell)) if score > 0 => self.trace_back(cell, score, &[], None),
            _ => GraphMapping { position: 0, score: 0, node_cigars: Vec::new() },
        }
    }

    /// Pinned multi-traceback from the synthetic sink's final cell:
    /// up to `max_alt` alignments in descending score order.
    pub fn trace_back_pinned_multi(&self, max_alt: usize) -> Vec<GraphMapping> {
        let dummy = self.graph.dummy
            .unwrap_or_else(|| panic!("error:[Aligner] pinned traceback without pinning node"));
        let start = Cell { node: dummy, i: self.read_len(), j: 0, state: AlignState::Match };
        let score = self.cell_value(&start);

        if score <= 0 {
            return vec![GraphMapping { position: 0, score, node_cigars: Vec::new() }];
        }

        let mut stack = AltTracebackStack::new(max_alt, 0);
        stack.propose(score, start, Vec::new());

        let mut results = Vec::new();
        let mut k = 0;
        while k < max_alt {
            let Some((score, start, deflections)) = stack.get(k) else {
                break;
            };
            results.push(self.trace_back(start, score, &deflections, Some(&mut stack)));
            k += 1;
        }

        results
    }

    /// Global multi-traceback over the given start cells (one per sink):
    /// up to `max_alt` alignments in descending score order, stopping the
    /// enumeration once scores drop to zero or below.
    pub fn trace_back_global_multi(&self, starts: &[Cell], max_alt: usize) -> Vec<GraphMapping> {
        let mut best: Option<(i32, Cell)> = None;
        for &start in starts {
            let value = self.cell_value(&start);
            if best.map_or(true, |(s, _)| value > s) {
                best = Some((value, start));
            }
        }
        let (score, start) = best
            .unwrap_or_else(|| panic!("error:[Aligner] global traceback without sink cells"));

        if score <= 0 {
            // still a valid global alignment, but nothing below it is worth
            // enumerating
            return vec![self.trace_back(start, score, &[], None)];
        }

        let mut stack = AltTracebackStack::new(max_alt, 0);
        for &start in starts {
            stack.propose(self.cell_value(&start), start, Vec::new());
        }

        let mut results = Vec::new();
        let mut k = 0;
        while k < max_alt {
            let Some((score, start, deflections)) = stack.get(k) else {
                break;
            };
            results.push(self.trace_back(start, score, &deflections, Some(&mut stack)));
            k += 1;
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::mock::{create_reversing_edge_graph, create_snp_bubble_graph};
    use crate::graph::Edge;
    use crate::aligner::scoring::{create_nt_table, Scoring};

    fn profile_for(read: &[u8], scoring: &Scoring) -> (Vec<u8>, Vec<[i32; 5]>) {
        let nt_table = create_nt_table();
        let matrix = scoring.score_matrix();
        let nts: Vec<u8> = read.iter().map(|b| nt_table[*b as usize]).collect();
        let profile = nts.iter()
            .map(|&q| {
                let mut row = [0i32; 5];
                for (r, entry) in row.iter_mut().enumerate() {
                    *entry = matrix[r][q as usize];
                }
                row
            })
            .collect();
        (nts, profile)
    }

    #[test]
    fn test_dp_graph_build() {
        let g = create_snp_bubble_graph();
        let dp = DpGraph::build(&g, &create_nt_table(), false);

        assert_eq!(dp.nodes.len(), 4);
        assert_eq!(dp.sinks().count(), 1);
        // the anchor node precedes both alleles
        assert!(dp.nodes[0].preds.is_empty());
        assert_eq!(dp.nodes[3].preds.len(), 2);
    }

    #[test]
    fn test_dp_graph_pinning_node() {
        let g = create_snp_bubble_graph();
        let dp = DpGraph::build(&g, &create_nt_table(), true);

        let dummy = dp.dummy.unwrap();
        assert_eq!(dp.nodes[dummy].id, PINNING_NODE_ID);
        assert_eq!(dp.nodes[dummy].seq, vec![NT_N as u8]);
        assert_eq!(dp.nodes[dummy].preds, vec![3]);
    }

    #[test]
    #[should_panic(expected = "reversing edge")]
    fn test_reversing_edge_is_fatal() {
        let g = create_reversing_edge_graph();
        DpGraph::build(&g, &create_nt_table(), false);
    }

    #[test]
    fn test_doubly_reversed_edge_is_flipped() {
        let mut g = crate::graph::VariationGraph::new();
        g.add_node(1, "ACGT");
        g.add_node(2, "ACGT");
        // walkable as 1 -> 2 despite the reversed encoding
        g.add_edge(Edge::new(2, true, 1, true)).unwrap();

        let dp = DpGraph::build(&g, &create_nt_table(), false);
        let one = dp.nodes.iter().position(|n| n.id == 1).unwrap();
        let two = dp.nodes.iter().position(|n| n.id == 2).unwrap();
        assert_eq!(dp.nodes[two].preds, vec![one]);
    }

    #[test]
    fn test_local_fill_perfect_match() {
        let mut g = crate::graph::VariationGraph::new();
        g.add_node(1, "AAAACCCAAAA");

        let scoring = Scoring::default();
        let (nts, profile) = profile_for(b"CCC", &scoring);
        let dp_graph = DpGraph::build(&g, &create_nt_table(), false);
        let mut dp = GraphDp::new(
            &dp_graph, nts, &profile,
            scoring.gap_open, scoring.gap_extend, 0,
            FillMode::Local, None,
        );
        dp.fill();

        let (score, cell) = dp.best_cell().unwrap();
        assert_eq!(score, 3 * scoring.match_score);
        assert_eq!(cell.j, 6);

        let gm = dp.trace_back_local();
        assert_eq!(gm.score, 3);
        assert_eq!(gm.position, 4);
        assert_eq!(gm.node_cigars.len(), 1);
        assert_eq!(gm.node_cigars[0].elements.as_slice(), &[CigarElement { op: b'M', len: 3 }]);
    }
}
