//! Scoring model for sequence-to-graph alignment: match/mismatch and affine
//! gap parameters, the 5x5 nucleotide substitution matrix, the base-quality
//! adjusted variant, and recovery of the score-to-log-likelihood constant.

use serde::{Deserialize, Serialize};

/// Number of distinct nucleotide codes (A, C, G, T, N).
pub const NUM_NTS: usize = 5;

/// Index of N in the nucleotide tables.
pub const NT_N: usize = 4;

/// Build the byte -> nucleotide index table. Everything outside ACGT
/// (either case) maps to N.
pub fn create_nt_table() -> [u8; 256] {
    let mut table = [NT_N as u8; 256];
    for (chars, code) in [(b"Aa", 0u8), (b"Cc", 1), (b"Gg", 2), (b"Tt", 3)] {
        for &c in chars {
            table[c as usize] = code;
        }
    }

    table
}

/// Alignment score parameters. All values are magnitudes: mismatch and gap
/// costs are applied negatively. The affine cost of a gap of length L is
/// `gap_open + L * gap_extend`, with `gap_open` paid once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch: i32,
    pub gap_open: i32,
    pub gap_extend: i32,
}

impl Scoring {
    pub fn new(match_score: i32, mismatch: i32, gap_open: i32, gap_extend: i32) -> Self {
        Self { match_score, mismatch, gap_open, gap_extend }
    }

    /// The 5x5 substitution matrix: `match_score` on the ACGT diagonal,
    /// `-mismatch` off it, and 0 anywhere N is involved.
    pub fn score_matrix(&self) -> [[i32; NUM_NTS]; NUM_NTS] {
        let mut matrix = [[0; NUM_NTS]; NUM_NTS];
        for i in 0..NT_N {
            for j in 0..NT_N {
                matrix[i][j] = if i == j { self.match_score } else { -self.mismatch };
            }
        }

        matrix
    }

    /// Score of a gapless all-match alignment of `sequence`.
    pub fn score_exact_match(&self, sequence: &str) -> i32 {
        self.match_score * sequence.len() as i32
    }
}

impl Default for Scoring {
    /// The conventional DNA defaults: +1 match, -4 mismatch, 6/1 affine gap.
    fn default() -> Self {
        Self::new(1, 4, 6, 1)
    }
}

/// Background nucleotide frequencies implied by a GC content.
fn nt_freqs(gc_content: f64) -> [f64; 4] {
    let at = (1.0 - gc_content) / 2.0;
    let gc = gc_content / 2.0;
    [at, gc, gc, at]
}

/// Recover the scale constant lambda such that alignment scores times lambda
/// are log-likelihoods: the unique positive root of
/// `sum_ij p_i p_j exp(lambda * s_ij) = 1` under the background frequencies
/// implied by `gc_content`. Solved by bracketing and bisection to `tol`.
pub fn recover_log_base(match_score: i32, mismatch: i32, gc_content: f64, tol: f64) -> f64 {
    let freqs = nt_freqs(gc_content);
    let f = |lambda: f64| -> f64 {
        let mut sum = 0.0;
        for (i, &pi) in freqs.iter().enumerate() {
            for (j, &pj) in freqs.iter().enumerate() {
                let s = if i == j { match_score as f64 } else { -mismatch as f64 };
                sum += pi * pj * (lambda * s).exp();
            }
        }
        sum - 1.0
    };

    // f(0) = 0 with negative slope, then rises through the positive root
    let mut hi = 1.0;
    while f(hi) < 0.0 {
        hi *= 2.0;
    }
    let mut lo = hi;
    while f(lo) > 0.0 {
        lo /= 2.0;
    }

    while hi - lo > tol {
        let mid = (lo + hi) / 2.0;
        if f(mid) > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    (lo + hi) / 2.0
}

/// Base-quality adjusted substitution scores.
///
/// A flat table indexed by `quality * 25 + ref_base * 5 + read_base`, scaled
/// so the largest entry is `max_scaled_score`; gap parameters are scaled by
/// the same factor to keep their cost relative to matches unchanged.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualAdjTable {
    table: Vec<i8>,
    pub scaled_gap_open: i32,
    pub scaled_gap_extend: i32,
    pub max_qual: u8,
}

impl QualAdjTable {
    /// Derive the table from the Phred error model: at quality q the read
    /// base is wrong with probability `10^(-q/10)` (spread evenly over the
    /// three other bases), and each entry is the log-likelihood ratio
    /// against the background frequency, divided by lambda to land in score
    /// units.
    pub fn new(max_scaled_score: i32, max_qual: u8, scoring: &Scoring, gc_content: f64, tol: f64) -> Self {
        let lambda = recover_log_base(scoring.match_score, scoring.mismatch, gc_content, tol);
        let freqs = nt_freqs(gc_content);

        let mut unscaled = vec![0.0f64; (max_qual as usize + 1) * NUM_NTS * NUM_NTS];
        let mut max_entry = 0.0f64;
        for q in 0..=max_qual as usize {
            // quality 0 carries no information; cap the error rate at the
            // uniform 3/4 so the log ratio stays finite
            let err = f64::powf(10.0, -(q as f64) / 10.0).min(0.75);
            for i in 0..NT_N {
                for j in 0..NT_N {
                    let p = if i == j { 1.0 - err } else { err / 3.0 };
                    let entry = (p / freqs[j]).ln() / lambda;
                    unscaled[q * 25 + i * 5 + j] = entry;
                    max_entry = max_entry.max(entry);
                }
            }
        }

        let factor = max_scaled_score as f64 / max_entry;
        let table = unscaled.iter()
            .map(|v| (v * factor).round().clamp(i8::MIN as f64, i8::MAX as f64) as i8)
            .collect();

        Self {
            table,
            scaled_gap_open: (scoring.gap_open as f64 * factor).round() as i32,
            scaled_gap_extend: (scoring.gap_extend as f64 * factor).round() as i32,
            max_qual,
        }
    }

    /// Adjusted substitution score for a (quality, reference base, read base)
    /// triple; base arguments are nucleotide indices.
    #[inline]
    pub fn score(&self, qual: u8, ref_base: usize, read_base: usize) -> i32 {
        let q = qual.min(self.max_qual) as usize;
        self.table[q * 25 + ref_base * 5 + read_base] as i32
    }

    /// Score of a gapless all-match alignment under per-base qualities,
    /// summed along the matrix diagonal.
    pub fn score_exact_match(&self, sequence: &str, quality: &[u8], nt_table: &[u8; 256]) -> i32 {
        sequence.bytes()
            .zip(quality)
            .map(|(b, &q)| {
                let q = q.min(self.max_qual) as usize;
                self.table[q * 25 + 6 * nt_table[b as usize] as usize] as i32
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nt_table() {
        let table = create_nt_table();
        assert_eq!(table[b'A' as usize], 0);
        assert_eq!(table[b'c' as usize], 1);
        assert_eq!(table[b'G' as usize], 2);
        assert_eq!(table[b't' as usize], 3);
        assert_eq!(table[b'N' as usize], 4);
        assert_eq!(table[b'X' as usize], 4);
    }

    #[test]
    fn test_score_matrix() {
        let scoring = Scoring::default();
        let matrix = scoring.score_matrix();

        assert_eq!(matrix[0][0], 1);
        assert_eq!(matrix[1][3], -4);
        assert_eq!(matrix[4][0], 0);
        assert_eq!(matrix[2][4], 0);
    }

    #[test]
    fn test_recover_log_base() {
        let lambda = recover_log_base(1, 4, 0.5, 1e-12);
        assert!(lambda > 0.0);

        // the recovered lambda must satisfy the defining identity
        let mut sum = 0.0;
        for i in 0..4 {
            for j in 0..4 {
                let s = if i == j { 1.0 } else { -4.0 };
                sum += 0.0625 * (lambda * s).exp();
            }
        }
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_qual_adj_table() {
        let scoring = Scoring::default();
        let table = QualAdjTable::new(32, 40, &scoring, 0.5, 1e-12);

        // the best entry is a max-quality match at the requested ceiling
        assert_eq!(table.score(40, 0, 0), 32);

        // match scores grow with quality, mismatches shrink
        assert!(table.score(40, 1, 1) > table.score(10, 1, 1));
        assert!(table.score(40, 0, 3) < table.score(10, 0, 3));

        // anything involving N keeps the log-ratio of the uninformative model
        assert!(table.score(40, NT_N, 0).abs() <= table.score(40, 0, 0));

        // gap parameters are scaled into the same dynamic range
        assert!(table.scaled_gap_open > scoring.gap_open);
        assert!(table.scaled_gap_extend >= scoring.gap_extend);
    }

    #[test]
    fn test_exact_match_approaches_unadjusted() {
        let scoring = Scoring::default();
        let table = QualAdjTable::new(32, 40, &scoring, 0.5, 1e-12);
        let nt_table = create_nt_table();

        let seq = "ACGTACGTACGT";
        let qual = vec![40u8; seq.len()];
        let scaled = table.score_exact_match(seq, &qual, &nt_table);

        // in unscaled units a uniform max-quality read approaches match * len
        let factor = table.scaled_gap_open as f64 / scoring.gap_open as f64;
        let unscaled = scaled as f64 / factor;
        let ideal = scoring.score_exact_match(seq) as f64;
        assert!((unscaled - ideal).abs() < 0.1 * ideal);
    }
}
