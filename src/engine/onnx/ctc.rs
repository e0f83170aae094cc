//! CTC decoding of per-step class probabilities.
//!
//! Class 0 is the CTC blank. Input is a `[T, C]` matrix of softmax scores.

use std::collections::BTreeMap;

use ndarray::ArrayView2;

/// Decoded label sequence with confidences.
#[derive(Debug, Clone, PartialEq)]
pub struct CtcOutput {
    /// Class indices of the emitted characters
    pub labels: Vec<usize>,
    /// Confidence per emitted label
    pub label_confidences: Vec<f32>,
}

impl CtcOutput {
    /// Geometric mean of the label confidences, 0 for an empty sequence.
    pub fn confidence(&self) -> f32 {
        if self.label_confidences.is_empty() {
            return 0.0;
        }
        let log_sum: f32 = self.label_confidences.iter().map(|c| c.max(1e-6).ln()).sum();
        (log_sum / self.label_confidences.len() as f32).exp()
    }
}

/// Classes below this probability are not expanded during beam search.
const PRUNE_PROB: f32 = 1e-4;

/// Best class per step, collapsing repeats and dropping blanks.
pub fn greedy(probs: ArrayView2<f32>) -> CtcOutput {
    let mut labels = Vec::new();
    let mut label_confidences = Vec::new();
    let mut prev = 0;

    for row in probs.rows() {
        let (best, conf) = row
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (c, &p)| if p > acc.1 { (c, p) } else { acc });

        if best != 0 && best != prev {
            labels.push(best);
            label_confidences.push(conf);
        }
        prev = best;
    }

    CtcOutput {
        labels,
        label_confidences,
    }
}

/// Prefix beam search keeping `width` prefixes per step.
///
/// Unlike [`greedy`], this sums the probability of every alignment that
/// collapses to the same prefix, so a character spread thinly over several
/// steps can still win against the blank.
pub fn beam_search(probs: ArrayView2<f32>, width: usize) -> CtcOutput {
    let width = width.max(1);
    // prefix -> (ends in blank, ends in non-blank)
    let mut beams: BTreeMap<Vec<usize>, (f64, f64)> = BTreeMap::new();
    beams.insert(Vec::new(), (1.0, 0.0));

    for row in probs.rows() {
        let mut next: BTreeMap<Vec<usize>, (f64, f64)> = BTreeMap::new();

        for (prefix, &(pb, pnb)) in &beams {
            for (c, &p) in row.iter().enumerate() {
                if p < PRUNE_PROB {
                    continue;
                }
                let p = p as f64;

                if c == 0 {
                    next.entry(prefix.clone()).or_default().0 += (pb + pnb) * p;
                    continue;
                }

                let mut extended = prefix.clone();
                extended.push(c);

                if prefix.last() == Some(&c) {
                    // A repeat only extends across a blank
                    next.entry(extended).or_default().1 += pb * p;
                    next.entry(prefix.clone()).or_default().1 += pnb * p;
                } else {
                    next.entry(extended).or_default().1 += (pb + pnb) * p;
                }
            }
        }

        let mut ranked: Vec<(Vec<usize>, (f64, f64))> = next.into_iter().collect();
        ranked.sort_by(|a, b| (b.1 .0 + b.1 .1).total_cmp(&(a.1 .0 + a.1 .1)));
        ranked.truncate(width);

        let total: f64 = ranked.iter().map(|(_, (pb, pnb))| pb + pnb).sum();
        if total <= 0.0 {
            break;
        }
        beams = ranked
            .into_iter()
            .map(|(prefix, (pb, pnb))| (prefix, (pb / total, pnb / total)))
            .collect();
    }

    let labels = beams
        .iter()
        .max_by(|a, b| (a.1 .0 + a.1 .1).total_cmp(&(b.1 .0 + b.1 .1)))
        .map(|(prefix, _)| prefix.clone())
        .unwrap_or_default();

    let label_confidences = align_confidences(probs, &labels);
    CtcOutput {
        labels,
        label_confidences,
    }
}

/// Peak probability of each label inside a monotonic window of steps.
fn align_confidences(probs: ArrayView2<f32>, labels: &[usize]) -> Vec<f32> {
    let steps = probs.nrows();
    let mut start = 0;
    let mut confidences = Vec::with_capacity(labels.len());

    for (k, &label) in labels.iter().enumerate() {
        let remaining = labels.len() - k - 1;
        let end = steps.saturating_sub(remaining).max(start + 1).min(steps);

        let (at, peak) = (start..end)
            .map(|t| (t, probs[[t, label]]))
            .fold((start, 0.0f32), |acc, cur| if cur.1 > acc.1 { cur } else { acc });

        confidences.push(peak);
        start = (at + 1).min(steps.saturating_sub(1));
    }

    confidences
}
