//! Before/after comparison across a full recalculation.

use std::collections::HashMap;
use std::ops::Range;

use thiserror::Error;
use tracing::debug;

use crate::models::{RouteResult, TrackPoint};
use crate::segment::SegmentCollection;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompareError {
    #[error("route now has {actual} segments, comparison started with {expected}")]
    TopologyChanged { expected: usize, actual: usize },
}

/// One stretch where the old and new point arrays of a segment disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DifferenceRegion {
    pub segment_index: usize,
    pub old_range: Range<usize>,
    pub new_range: Range<usize>,
}

/// Snapshot of the segment contents taken before a recalculation.
#[derive(Debug, Clone)]
pub struct CompareSession {
    snapshot: Vec<Option<RouteResult>>,
    observed: Vec<bool>,
    differences: Vec<DifferenceRegion>,
}

impl CompareSession {
    pub fn begin(segments: &SegmentCollection) -> Self {
        let snapshot: Vec<Option<RouteResult>> =
            segments.iter().map(|s| s.result().cloned()).collect();
        Self {
            observed: vec![false; snapshot.len()],
            snapshot,
            differences: Vec::new(),
        }
    }

    pub fn segment_count(&self) -> usize {
        self.snapshot.len()
    }

    /// Record a finished calculation for the segment at `segment_index`.
    ///
    /// Returns the number of difference regions found for that segment. A
    /// segment observed twice keeps only its latest regions.
    pub fn observe(&mut self, segment_index: usize, result: &RouteResult) -> usize {
        let Some(old) = self.snapshot.get(segment_index) else {
            debug!(segment_index, "Ignoring segment added after the comparison started");
            return 0;
        };
        let old_points = old.as_ref().map(|r| r.points()).unwrap_or(&[]);
        let regions: Vec<DifferenceRegion> = diff_points(old_points, result.points())
            .into_iter()
            .map(|(old_range, new_range)| DifferenceRegion {
                segment_index,
                old_range,
                new_range,
            })
            .collect();

        self.differences.retain(|d| d.segment_index != segment_index);
        let count = regions.len();
        self.differences.extend(regions);
        self.differences.sort_by_key(|d| (d.segment_index, d.old_range.start));
        self.observed[segment_index] = true;
        count
    }

    pub fn differences(&self) -> &[DifferenceRegion] {
        &self.differences
    }

    /// Every segment of the snapshot has reported back.
    pub fn is_complete(&self) -> bool {
        self.observed.iter().all(|seen| *seen)
    }

    /// Put the snapshot contents back. Returns how many segments were restored.
    pub fn rollback(self, segments: &mut SegmentCollection) -> Result<usize, CompareError> {
        if segments.len() != self.snapshot.len() {
            debug!(
                expected = self.snapshot.len(),
                actual = segments.len(),
                "Refusing rollback across a topology change"
            );
            return Err(CompareError::TopologyChanged {
                expected: self.snapshot.len(),
                actual: segments.len(),
            });
        }
        let mut restored = 0;
        for (index, old) in self.snapshot.into_iter().enumerate() {
            if let Some(old) = old {
                segments.update_at(index, old);
                restored += 1;
            }
        }
        Ok(restored)
    }
}

type CoordKey = (i64, i64);

fn coord_key(point: &TrackPoint) -> CoordKey {
    ((point.lat * 1e6).round() as i64, (point.lon * 1e6).round() as i64)
}

/// Align two point arrays and return the (old, new) index ranges that differ.
///
/// A region opens at the first disagreement and closes at the first old point
/// whose coordinates reappear in the new array at or after the scan position.
pub fn diff_points(old: &[TrackPoint], new: &[TrackPoint]) -> Vec<(Range<usize>, Range<usize>)> {
    let mut positions: HashMap<CoordKey, Vec<usize>> = HashMap::new();
    for (j, point) in new.iter().enumerate() {
        positions.entry(coord_key(point)).or_default().push(j);
    }

    let mut regions = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    while i < old.len() && j < new.len() {
        if coord_key(&old[i]) == coord_key(&new[j]) {
            i += 1;
            j += 1;
            continue;
        }

        let resync = (i..old.len()).find_map(|k| {
            let list = positions.get(&coord_key(&old[k]))?;
            let at = list.partition_point(|&x| x < j);
            list.get(at).map(|&m| (k, m))
        });

        match resync {
            Some((k, m)) => {
                regions.push((i..k, j..m));
                i = k;
                j = m;
            }
            None => {
                regions.push((i..old.len(), j..new.len()));
                i = old.len();
                j = new.len();
            }
        }
    }
    if i < old.len() || j < new.len() {
        regions.push((i..old.len(), j..new.len()));
    }
    regions
}
