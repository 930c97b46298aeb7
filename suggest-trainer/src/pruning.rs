//! Corpus-wide text fingerprint pruning
//!
//! Fingerprints occurring in almost no records or in almost every record
//! carry the least signal. When the number of distinct fingerprints exceeds
//! the ceiling, fingerprints are removed from whichever extreme of the
//! occurrence-count ordering is nearer its boundary until the ceiling is met.

use std::collections::{BTreeMap, BTreeSet};
use suggest_common::model::{fingerprint_set, Fingerprint};

/// Rows restricted to the surviving fingerprints
#[derive(Debug, Clone, PartialEq)]
pub struct PrunedRows {
    pub rows: Vec<Vec<Fingerprint>>,
    pub distinct_before: usize,
    pub distinct_after: usize,
}

/// Prune `rows` down to at most `ceiling` distinct fingerprints
///
/// Fingerprints are ordered by (occurrence count, id). While above the
/// ceiling, the least frequent one is removed if its count is no larger than
/// the number of records missing the most frequent one; otherwise the most
/// frequent one is removed.
pub fn prune_fingerprints(rows: Vec<Vec<Fingerprint>>, ceiling: usize) -> PrunedRows {
    let rows: Vec<Vec<Fingerprint>> = rows
        .into_iter()
        .map(|row| fingerprint_set(row))
        .collect();
    let num_records = rows.len();

    let mut counts: BTreeMap<Fingerprint, usize> = BTreeMap::new();
    for &fp in rows.iter().flatten() {
        *counts.entry(fp).or_insert(0) += 1;
    }
    let distinct_before = counts.len();

    if distinct_before <= ceiling {
        return PrunedRows {
            rows,
            distinct_before,
            distinct_after: distinct_before,
        };
    }

    let mut by_count: Vec<(usize, Fingerprint)> =
        counts.into_iter().map(|(fp, n)| (n, fp)).collect();
    by_count.sort_unstable();

    // Survivors are by_count[lo..hi]
    let mut lo = 0;
    let mut hi = by_count.len();
    while hi - lo > ceiling {
        let min_count = by_count[lo].0;
        let max_count = by_count[hi - 1].0;
        if min_count <= num_records - max_count {
            lo += 1;
        } else {
            hi -= 1;
        }
    }

    let kept: BTreeSet<Fingerprint> = by_count[lo..hi].iter().map(|&(_, fp)| fp).collect();
    let rows = rows
        .into_iter()
        .map(|row| row.into_iter().filter(|fp| kept.contains(fp)).collect())
        .collect();

    PrunedRows {
        rows,
        distinct_before,
        distinct_after: kept.len(),
    }
}
