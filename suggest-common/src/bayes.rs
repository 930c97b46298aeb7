//! Laplace-smoothed Naive Bayes statistics engine
//!
//! Builds a per-target model from (fingerprint set, label) rows:
//!
//! 1. Tally how often each fingerprint occurs and how often it co-occurs with
//!    an active label. Fingerprints present in every row cannot discriminate
//!    and are dropped; the rest are kept in ascending order.
//! 2. Each kept fingerprint contributes `ln((nA + 1) / (nT * pAT + 1))`, where
//!    `pAT` is the active fraction of the training set. A row's raw score is
//!    the sum of the contributions of the fingerprints it contains.
//! 3. The training rows are scored with the model just built (no held-out
//!    split) and an ROC curve is derived from those estimates.
//! 4. The AUC is the trapezoidal area under the curve, and the calibration
//!    band is read off the curve around its point nearest the ideal corner.
//!
//! No I/O and no shared state: identical inputs in identical order produce
//! bit-identical output.

use crate::model::{fingerprint_set, Fingerprint, Model, TargetId};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Adjacent ROC points closer than this on both axes are merged
const ROC_DEDUP_EPSILON: f64 = 1e-5;

/// Fraction of the estimate span placed beyond each end as sentinel thresholds
const SENTINEL_FRACTION: f64 = 0.01;

/// Scaled score when the calibration band collapses to a single point
const DEGENERATE_HIGH: f64 = 0.7;
const DEGENERATE_LOW: f64 = 0.3;

/// One point of the ROC curve with the threshold that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocPoint {
    /// False positive rate
    pub x: f64,
    /// True positive rate
    pub y: f64,
    pub threshold: f64,
}

/// ROC curve with both coordinates in ascending order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RocCurve {
    points: Vec<RocPoint>,
}

impl RocCurve {
    /// Derive the curve from per-row estimates
    ///
    /// Rows are ordered by estimate (ties by original index). Candidate
    /// thresholds are the midpoints between consecutive distinct estimates
    /// plus one sentinel beyond each end. Sweeping the thresholds upward, the
    /// counts of active and inactive rows falling below the threshold are
    /// accumulated; each threshold yields `(1 - inactive_below/inactive,
    /// 1 - active_below/active)`, i.e. the (FPR, TPR) pair of classifying
    /// everything at or above the threshold as active.
    fn from_estimates(estimates: &[f64], labels: &[bool], num_active: usize) -> Self {
        let num_rows = estimates.len();
        let num_inactive = num_rows - num_active;

        let mut order: Vec<usize> = (0..num_rows).collect();
        order.sort_by(|&a, &b| estimates[a].total_cmp(&estimates[b]).then(a.cmp(&b)));

        let lowest = estimates[order[0]];
        let highest = estimates[order[num_rows - 1]];
        let span = highest - lowest;
        let pad = if span > 0.0 {
            SENTINEL_FRACTION * span
        } else {
            SENTINEL_FRACTION * lowest.abs().max(1.0)
        };

        let mut thresholds = Vec::with_capacity(num_rows + 1);
        thresholds.push(lowest - pad);
        for pair in order.windows(2) {
            let (a, b) = (estimates[pair[0]], estimates[pair[1]]);
            if b > a {
                thresholds.push(0.5 * (a + b));
            }
        }
        thresholds.push(highest + pad);

        // Ascending thresholds give descending coordinates
        let mut descending = Vec::with_capacity(thresholds.len());
        let mut cursor = 0;
        let mut active_below = 0usize;
        let mut inactive_below = 0usize;
        for &threshold in &thresholds {
            while cursor < num_rows && estimates[order[cursor]] < threshold {
                if labels[order[cursor]] {
                    active_below += 1;
                } else {
                    inactive_below += 1;
                }
                cursor += 1;
            }
            descending.push(RocPoint {
                x: 1.0 - inactive_below as f64 / num_inactive as f64,
                y: 1.0 - active_below as f64 / num_active as f64,
                threshold,
            });
        }

        let mut points: Vec<RocPoint> = Vec::with_capacity(descending.len());
        for point in descending.into_iter().rev() {
            if let Some(last) = points.last() {
                if (point.x - last.x).abs() < ROC_DEDUP_EPSILON
                    && (point.y - last.y).abs() < ROC_DEDUP_EPSILON
                {
                    continue;
                }
            }
            points.push(point);
        }

        Self { points }
    }

    pub fn points(&self) -> &[RocPoint] {
        &self.points
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    /// Trapezoidal area under the curve
    pub fn area(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1].x - w[0].x) * (w[0].y + w[1].y) * 0.5)
            .sum()
    }

    /// Calibration band `(low, mid, high)`
    ///
    /// The midpoint is the threshold of the point maximising `y - x`. From
    /// there the curve is walked left while `x > 0` and right while `y < 1`;
    /// the smaller of the two threshold deltas is applied on both sides. A
    /// best point on the ideal corner gives a collapsed band.
    fn calibration(&self) -> (f64, f64, f64) {
        let points = &self.points;
        let mut best = 0;
        for (idx, point) in points.iter().enumerate() {
            if point.y - point.x > points[best].y - points[best].x {
                best = idx;
            }
        }
        let mid = points[best].threshold;

        let mut lo = best;
        while lo > 0 && points[lo].x > 0.0 {
            lo -= 1;
        }
        let mut hi = best;
        while hi + 1 < points.len() && points[hi].y < 1.0 {
            hi += 1;
        }

        let delta = (points[lo].threshold - mid)
            .abs()
            .min((mid - points[hi].threshold).abs());
        (mid - delta, mid, mid + delta)
    }
}

/// Result of a successful model build
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianModel {
    /// Kept fingerprints, ascending
    pub fingerprints: Vec<Fingerprint>,
    /// Log-odds contribution per kept fingerprint
    pub contributions: Vec<f64>,
    pub roc: RocCurve,
    pub roc_auc: f64,
    pub calibration_low: f64,
    pub calibration_mid: f64,
    pub calibration_high: f64,
}

impl BayesianModel {
    pub fn raw_score(&self, fingerprints: &[Fingerprint]) -> f64 {
        raw_score(&self.fingerprints, &self.contributions, fingerprints)
    }

    pub fn scaled_score(&self, fingerprints: &[Fingerprint]) -> f64 {
        scale_score(
            self.raw_score(fingerprints),
            self.calibration_low,
            self.calibration_high,
        )
    }

    /// Stamp the model for publication
    pub fn into_model(self, target: TargetId, watermark: i64, is_explicit: bool) -> Model {
        Model {
            target,
            watermark,
            fingerprints: self.fingerprints,
            contributions: self.contributions,
            calibration_low: self.calibration_low,
            calibration_high: self.calibration_high,
            roc_auc: self.roc_auc,
            is_explicit,
        }
    }
}

/// Naive Bayes model builder
pub struct NaiveBayesian;

impl NaiveBayesian {
    /// Build a model from parallel fingerprint rows and labels
    ///
    /// Returns `None` when no discriminative model is possible: no rows, no
    /// active rows, no inactive rows, or no fingerprint that is absent from
    /// at least one row.
    ///
    /// # Panics
    /// If `rows` and `labels` differ in length.
    pub fn build_model(rows: &[Vec<Fingerprint>], labels: &[bool]) -> Option<BayesianModel> {
        assert_eq!(
            rows.len(),
            labels.len(),
            "fingerprint rows and labels must be parallel"
        );

        let num_rows = rows.len();
        let num_active = labels.iter().filter(|&&active| active).count();
        if num_rows == 0 || num_active == 0 || num_active == num_rows {
            return None;
        }

        let rows: Vec<Vec<Fingerprint>> = rows
            .iter()
            .map(|row| fingerprint_set(row.iter().copied()))
            .collect();

        // fingerprint -> (occurrences, active occurrences)
        let mut tallies: BTreeMap<Fingerprint, (usize, usize)> = BTreeMap::new();
        for (row, &active) in rows.iter().zip(labels) {
            for &fp in row {
                let tally = tallies.entry(fp).or_insert((0, 0));
                tally.0 += 1;
                if active {
                    tally.1 += 1;
                }
            }
        }

        let p_active = num_active as f64 / num_rows as f64;
        let (fingerprints, contributions): (Vec<Fingerprint>, Vec<f64>) = tallies
            .into_iter()
            .filter(|(_, (count, _))| *count < num_rows)
            .map(|(fp, (count, active))| {
                let contribution =
                    ((active as f64 + 1.0) / (count as f64 * p_active + 1.0)).ln();
                (fp, contribution)
            })
            .unzip();
        if fingerprints.is_empty() {
            return None;
        }

        let estimates: Vec<f64> = rows
            .iter()
            .map(|row| raw_score(&fingerprints, &contributions, row))
            .collect();

        let roc = RocCurve::from_estimates(&estimates, labels, num_active);
        let roc_auc = roc.area();
        let (calibration_low, calibration_mid, calibration_high) = roc.calibration();

        Some(BayesianModel {
            fingerprints,
            contributions,
            roc,
            roc_auc,
            calibration_low,
            calibration_mid,
            calibration_high,
        })
    }
}

/// Sum of the contributions of `row`'s fingerprints that the model knows
///
/// `model_fps` must be sorted; a fingerprint without a contribution adds 0.
pub(crate) fn raw_score(
    model_fps: &[Fingerprint],
    contributions: &[f64],
    row: &[Fingerprint],
) -> f64 {
    row.iter()
        .filter_map(|fp| model_fps.binary_search(fp).ok())
        .filter_map(|idx| contributions.get(idx))
        .sum()
}

/// Map a raw score onto (0,1) using the calibration band
///
/// A collapsed band (`low == high`) splits at `low` into fixed 0.7 / 0.3.
pub fn scale_score(raw: f64, calibration_low: f64, calibration_high: f64) -> f64 {
    if calibration_high > calibration_low {
        ((raw - calibration_low) / (calibration_high - calibration_low)).atan() / PI + 0.5
    } else if raw >= calibration_low {
        DEGENERATE_HIGH
    } else {
        DEGENERATE_LOW
    }
}
