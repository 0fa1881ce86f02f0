//! Posterior-odds mapping quality over a set of alignment scores, with an
//! exact overflow-safe computation and a one-pass approximation.

use tracing::trace;

/// 10 / ln(10): converts natural-log odds to the Phred scale.
const QUALITY_SCALE_FACTOR: f64 = 10.0 / std::f64::consts::LN_10;

/// ln(f64::MAX), above which summed exponentials would overflow.
fn exp_overflow_limit() -> f64 {
    f64::MAX.ln()
}

/// `ln(exp(x) + exp(y))` computed without overflowing either exponential.
pub(crate) fn add_log(log_x: f64, log_y: f64) -> f64 {
    if log_x > log_y {
        log_x + (log_y - log_x).exp().ln_1p()
    } else {
        log_y + (log_x - log_y).exp().ln_1p()
    }
}

pub(crate) fn phred_to_prob(phred: f64) -> f64 {
    f64::powf(10.0, -phred / 10.0)
}

pub(crate) fn prob_to_phred(prob: f64) -> f64 {
    -10.0 * prob.log10()
}

/// Exact mapping quality of the best among `scaled_scores` (scores already
/// multiplied by the log-base). Returns the quality and the index of the
/// maximum.
///
/// A single score is compared against a synthetic null alignment of 0. When
/// the direct sum of exponentials cannot overflow it is used as is; otherwise
/// the computation switches to an incremental log-sum-exp.
pub(crate) fn maximum_mapping_quality_exact(scaled_scores: &mut Vec<f64>) -> (f64, usize) {
    // assume a null alignment of 0.0 for comparison since this is local
    if scaled_scores.len() == 1 {
        scaled_scores.push(0.0);
    }
    let size = scaled_scores.len();

    // strict comparison keeps the first of tied maxima, like the
    // approximate variant below
    let mut max_score = scaled_scores[0];
    let mut max_idx = 0;
    for (i, &score) in scaled_scores.iter().enumerate().skip(1) {
        if score > max_score {
            max_score = score;
            max_idx = i;
        }
    }

    let quality = if max_score * (size as f64) < exp_overflow_limit() {
        // no risk of overflow, sum the exponentials directly
        let numer: f64 = scaled_scores.iter()
            .enumerate()
            .filter(|(i, _)| *i != max_idx)
            .map(|(_, x)| x.exp())
            .sum();
        -10.0 * (numer / (numer + max_score.exp())).log10()
    } else {
        // work in log-transformed values to avoid overflow
        let log_sum_exp = scaled_scores.iter().copied().reduce(add_log).unwrap();
        -10.0 * (1.0 - (max_score - log_sum_exp).exp()).log10()
    };

    (quality, max_idx)
}

/// One-pass approximation: the Phred-scaled gap between the best score and
/// the runner-up, discounted by the log of the runner-up's tie count.
pub(crate) fn maximum_mapping_quality_approx(scaled_scores: &mut Vec<f64>) -> (f64, usize) {
    if scaled_scores.len() == 1 {
        scaled_scores.push(0.0);
    }

    let mut max_score = scaled_scores[0];
    let mut max_idx = 0;
    let mut next_score = f64::MIN;
    let mut next_count = 0usize;

    for (i, &score) in scaled_scores.iter().enumerate().skip(1) {
        if score > max_score {
            if next_score == max_score {
                next_count += 1;
            } else {
                next_score = max_score;
                next_count = 1;
            }
            max_score = score;
            max_idx = i;
        } else if score > next_score {
            next_score = score;
            next_count = 1;
        } else if score == next_score {
            next_count += 1;
        }
    }

    let tie_term = if next_count > 1 { (next_count as f64).ln() } else { 0.0 };
    let quality = (QUALITY_SCALE_FACTOR * (max_score - next_score - tie_term)).max(0.0);
    trace!(max_score, next_score, next_count, quality, "approximate mapping quality");

    (quality, max_idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_log() {
        let sum = add_log(2.0f64.ln(), 3.0f64.ln());
        assert!((sum - 5.0f64.ln()).abs() < 1e-12);

        // far-apart magnitudes stay finite
        let sum = add_log(1000.0, -1000.0);
        assert!((sum - 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_exact_collapse() {
        // scores [50, 10, 10, 10] scaled by log base 0.1
        let mut scaled = vec![5.0, 1.0, 1.0, 1.0];
        let (mq, max_idx) = maximum_mapping_quality_exact(&mut scaled);

        assert_eq!(max_idx, 0);
        let numer = 3.0 * 1.0f64.exp();
        let expected = -10.0 * (numer / (numer + 5.0f64.exp())).log10();
        assert!((mq - expected).abs() < 1e-9);
    }

    #[test]
    fn test_exact_tie_keeps_first() {
        // two equally-best scores: the first one is reported as the maximum
        let mut scaled = vec![4.0, 4.0, 1.0];
        let (mq, max_idx) = maximum_mapping_quality_exact(&mut scaled);

        assert_eq!(max_idx, 0);
        let numer = 4.0f64.exp() + 1.0f64.exp();
        let expected = -10.0 * (numer / (numer + 4.0f64.exp())).log10();
        assert!((mq - expected).abs() < 1e-9);

        // the approximation agrees on which entry wins the tie
        let mut scaled = vec![4.0, 4.0, 1.0];
        let (_, approx_idx) = maximum_mapping_quality_approx(&mut scaled);
        assert_eq!(approx_idx, 0);
    }

    #[test]
    fn test_exact_overflow_branch() {
        // scores large enough that direct exponentials would overflow
        let mut scaled = vec![800.0, 790.0];
        let (mq, max_idx) = maximum_mapping_quality_exact(&mut scaled);

        assert_eq!(max_idx, 0);
        assert!(mq.is_finite());
        assert!(mq > 0.0);
    }

    #[test]
    fn test_exact_single_score_uses_null() {
        let mut scaled = vec![3.0];
        let (mq, max_idx) = maximum_mapping_quality_exact(&mut scaled);

        assert_eq!(max_idx, 0);
        let expected = -10.0 * (1.0 / (1.0 + 3.0f64.exp())).log10();
        assert!((mq - expected).abs() < 1e-9);
    }

    #[test]
    fn test_approx_tie_count() {
        let mut scaled = vec![5.0, 1.0, 1.0, 1.0];
        let (mq, max_idx) = maximum_mapping_quality_approx(&mut scaled);

        assert_eq!(max_idx, 0);
        let expected = QUALITY_SCALE_FACTOR * (5.0 - 1.0 - 3.0f64.ln());
        assert!((mq - expected).abs() < 1e-9);
    }

    #[test]
    fn test_approx_never_negative() {
        let mut scaled = vec![1.0, 1.0];
        let (mq, _) = maximum_mapping_quality_approx(&mut scaled);
        assert_eq!(mq, 0.0);
    }
}
