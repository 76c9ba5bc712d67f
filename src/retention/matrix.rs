//! Folding aggregate rows into a triangular cohort matrix.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::{CohortCell, CohortCount, Period, RetentionMatrix, RetentionRow};

/// Sparse `(start_bucket, seen_bucket) -> count` map.
pub type CohortCounts = HashMap<(usize, usize), u64>;

/// Fold aggregate rows into a sparse map. A repeated key overwrites.
pub fn fold_counts(rows: impl IntoIterator<Item = CohortCount>) -> CohortCounts {
    let mut counts = CohortCounts::new();
    for row in rows {
        counts.insert((row.first_bucket, row.seen_bucket), row.count);
    }
    counts
}

/// Materialise the matrix over `anchors.len()` buckets.
///
/// `anchors[i]` is the start of bucket `i`. Row `i` holds cells for
/// `seen_bucket` in `[i, total_intervals)`; missing pairs count as zero.
pub fn build_matrix(period: Period, counts: &CohortCounts, anchors: &[DateTime<Utc>]) -> RetentionMatrix {
    let total_intervals = anchors.len();

    let rows = anchors
        .iter()
        .enumerate()
        .map(|(start_bucket, anchor_date)| RetentionRow {
            label: format!("{} {}", period, start_bucket),
            anchor_date: *anchor_date,
            values: (start_bucket..total_intervals)
                .map(|seen_bucket| CohortCell {
                    start_bucket,
                    seen_bucket,
                    count: counts.get(&(start_bucket, seen_bucket)).copied().unwrap_or(0),
                    members: Vec::new(),
                })
                .collect(),
        })
        .collect();

    RetentionMatrix { rows }
}
