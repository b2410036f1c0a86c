//! Detection quality metrics
//!
//! Scores inlier/outlier splits the way the experiments report them:
//! threshold-free ROC AUC plus confusion counts at a percentile of the
//! inlier scores.

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Confusion counts at a fixed threshold (outlier = positive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confusion {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl Confusion {
    /// Count predictions where `score > threshold` flags an anomaly.
    pub fn at_threshold(inlier_scores: &[f64], outlier_scores: &[f64], threshold: f64) -> Self {
        let mut c = Confusion::default();
        for &s in inlier_scores {
            if s > threshold {
                c.false_positives += 1;
            } else {
                c.true_negatives += 1;
            }
        }
        for &s in outlier_scores {
            if s > threshold {
                c.true_positives += 1;
            } else {
                c.false_negatives += 1;
            }
        }
        c
    }

    /// Compute precision (TP / (TP + FP)), 0 when nothing was flagged
    pub fn precision(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        if tp + fp > 0.0 {
            tp / (tp + fp)
        } else {
            0.0
        }
    }

    /// Compute recall (TP / (TP + FN)), 0 when there are no outliers
    pub fn recall(&self) -> f64 {
        let tp = self.true_positives as f64;
        let fn_ = self.false_negatives as f64;
        if tp + fn_ > 0.0 {
            tp / (tp + fn_)
        } else {
            0.0
        }
    }

    /// Compute F1 score
    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    /// False positive rate
    pub fn fp_rate(&self) -> f64 {
        let fp = self.false_positives as f64;
        let tn = self.true_negatives as f64;
        if fp + tn > 0.0 {
            fp / (fp + tn)
        } else {
            0.0
        }
    }
}

/// Summary of one scored inlier/outlier split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: String,
    pub inliers: usize,
    pub outliers: usize,
    pub auc: f64,
    /// Percentile of inlier scores used as the threshold
    pub percentile: f64,
    pub threshold: f64,
    pub confusion: Confusion,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mean_inlier_score: f64,
    pub mean_outlier_score: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Probability that a random outlier outscores a random inlier.
///
/// Mann-Whitney U over average ranks, so ties count half.
pub fn roc_auc(inlier_scores: &[f64], outlier_scores: &[f64]) -> Result<f64, ModelError> {
    if inlier_scores.is_empty() || outlier_scores.is_empty() {
        return Err(ModelError::EmptyInput("AUC needs both inliers and outliers"));
    }

    let mut all: Vec<(f64, bool)> = inlier_scores
        .iter()
        .map(|&s| (s, false))
        .chain(outlier_scores.iter().map(|&s| (s, true)))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < all.len() {
        let mut j = i;
        while j + 1 < all.len() && all[j + 1].0 == all[i].0 {
            j += 1;
        }
        // ranks are 1-based; tied block i..=j shares the mean rank
        let rank = (i + j) as f64 / 2.0 + 1.0;
        positive_rank_sum += rank * all[i..=j].iter().filter(|(_, pos)| *pos).count() as f64;
        i = j + 1;
    }

    let n_pos = outlier_scores.len() as f64;
    let n_neg = inlier_scores.len() as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Linear-interpolated percentile (`pct` in `[0, 100]`).
pub fn threshold_at_percentile(scores: &[f64], pct: f64) -> Result<f64, ModelError> {
    if scores.is_empty() {
        return Err(ModelError::EmptyInput("percentile of no scores"));
    }
    if !(0.0..=100.0).contains(&pct) {
        return Err(ModelError::InvalidConfig(format!(
            "percentile must be within [0, 100], got {pct}"
        )));
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Build the full report for a scored split.
pub fn evaluate(
    model: &str,
    inlier_scores: &[f64],
    outlier_scores: &[f64],
    percentile: f64,
) -> Result<EvaluationReport, ModelError> {
    let auc = roc_auc(inlier_scores, outlier_scores)?;
    let threshold = threshold_at_percentile(inlier_scores, percentile)?;
    let confusion = Confusion::at_threshold(inlier_scores, outlier_scores, threshold);

    Ok(EvaluationReport {
        model: model.to_string(),
        inliers: inlier_scores.len(),
        outliers: outlier_scores.len(),
        auc,
        percentile,
        threshold,
        confusion,
        precision: confusion.precision(),
        recall: confusion.recall(),
        f1: confusion.f1(),
        mean_inlier_score: mean(inlier_scores),
        mean_outlier_score: mean(outlier_scores),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_separation() {
        let auc = roc_auc(&[0.1, 0.2, 0.3], &[0.8, 0.9]).unwrap();
        assert!((auc - 1.0).abs() < 1e-12);
        let inverted = roc_auc(&[0.8, 0.9], &[0.1, 0.2, 0.3]).unwrap();
        assert!(inverted.abs() < 1e-12);
    }

    #[test]
    fn test_auc_ties_count_half() {
        let auc = roc_auc(&[0.5, 0.5], &[0.5, 0.5, 0.5]).unwrap();
        assert!((auc - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_auc_partial() {
        // pairs (o > i): 0.4>0.1, 0.4>0.3, 0.2>0.1 => 3 of 4
        let auc = roc_auc(&[0.1, 0.3], &[0.2, 0.4]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_auc_empty() {
        assert!(roc_auc(&[], &[1.0]).is_err());
    }

    #[test]
    fn test_percentile() {
        let scores = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(threshold_at_percentile(&scores, 0.0).unwrap(), 1.0);
        assert_eq!(threshold_at_percentile(&scores, 50.0).unwrap(), 3.0);
        assert_eq!(threshold_at_percentile(&scores, 100.0).unwrap(), 5.0);
        assert!((threshold_at_percentile(&scores, 90.0).unwrap() - 4.6).abs() < 1e-12);
        assert!(threshold_at_percentile(&scores, 101.0).is_err());
    }

    #[test]
    fn test_nothing_flagged_scores_zero() {
        let c = Confusion::at_threshold(&[0.1, 0.2], &[0.3, 0.4], 1.0);
        assert_eq!(c.true_positives, 0);
        assert_eq!(c.false_positives, 0);
        assert_eq!(c.precision(), 0.0);
        assert_eq!(c.recall(), 0.0);
        assert_eq!(c.f1(), 0.0);

        let no_outliers = Confusion::at_threshold(&[0.1], &[], 1.0);
        assert_eq!(no_outliers.recall(), 0.0);
    }

    #[test]
    fn test_evaluate_report() {
        let inliers = [0.1, 0.2, 0.3, 0.4];
        let outliers = [0.35, 0.9];
        let report = evaluate("pca", &inliers, &outliers, 50.0).unwrap();

        assert_eq!(report.model, "pca");
        assert!((report.threshold - 0.25).abs() < 1e-12);
        assert_eq!(report.confusion.true_positives, 2);
        assert_eq!(report.confusion.false_positives, 2);
        assert_eq!(report.confusion.true_negatives, 2);
        assert_eq!(report.confusion.false_negatives, 0);
        assert!((report.precision - 0.5).abs() < 1e-12);
        assert!((report.recall - 1.0).abs() < 1e-12);
        assert!((report.auc - 0.875).abs() < 1e-12);
    }
}
