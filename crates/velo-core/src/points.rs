//! Point index over the linked segments: distance search, ranged profile
//! iteration, file positions and aggregate statistics.

use serde::{Deserialize, Serialize};

use crate::models::{CommonValues, TrackIndex, TrackPoint};
use crate::segment::{Segment, SegmentCollection};
use crate::spatial::{bearing, offset_by_bearing};

/// Result of a distance lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// The matched point, or the point preceding an interpolated position.
    pub index: TrackIndex,
    /// Point with cumulative route values.
    pub point: TrackPoint,
    /// `false` when `point` was interpolated between two samples.
    pub exact: bool,
}

/// Which output file a distance falls into, and how far the next split is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilePosition {
    pub file_index: usize,
    pub remaining_m: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    pub distance_m: f64,
    pub time_s: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
    pub min_altitude_m: Option<f64>,
    pub max_altitude_m: Option<f64>,
    pub point_count: usize,
    pub segment_count: usize,
    pub linked_segments: usize,
    pub invalid_segments: usize,
}

/// The externally consumed view of the route.
#[derive(Debug, Clone, Default)]
pub struct PointCollection {
    segments: SegmentCollection,
}

impl PointCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &SegmentCollection {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut SegmentCollection {
        &mut self.segments
    }

    /// Number of addressable points (linked prefix only).
    pub fn len(&self) -> usize {
        self.segments.total_points()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total(&self) -> CommonValues {
        self.segments.total()
    }

    pub fn get(&self, index: TrackIndex) -> Option<TrackPoint> {
        if !index.is_valid() {
            return None;
        }
        let segment = self.segments.get(index.segment as usize)?;
        if !segment.is_linked() {
            return None;
        }
        segment.global_point(index.point as usize)
    }

    /// All addressable points in order with their global values.
    pub fn iter(&self) -> impl Iterator<Item = (TrackIndex, TrackPoint)> + '_ {
        self.segments.linked().enumerate().flat_map(|(si, segment)| {
            segment
                .points()
                .iter()
                .enumerate()
                .map(move |(pi, p)| (TrackIndex::new(si, pi), p.shifted(&segment.start())))
        })
    }

    /// Locate the point at `distance_m` along the route.
    ///
    /// Returns `None` outside `[0, total distance]`. Between samples the
    /// location is re-derived along the great circle from the preceding
    /// sample rather than by averaging coordinates.
    pub fn search(&self, distance_m: f64) -> Option<SearchResult> {
        let (segment_index, segment) = self.owning_segment(distance_m)?;
        let points = segment.points();
        let relative = distance_m - segment.start().distance_m;
        let pos = points.partition_point(|p| p.values.distance_m < relative);

        if pos >= points.len() {
            let last = points.len() - 1;
            return Some(SearchResult {
                index: TrackIndex::new(segment_index, last),
                point: points[last].shifted(&segment.start()),
                exact: true,
            });
        }

        if pos == 0 || points[pos].values.distance_m == relative {
            return Some(SearchResult {
                index: TrackIndex::new(segment_index, pos),
                point: points[pos].shifted(&segment.start()),
                exact: true,
            });
        }

        let a = &points[pos - 1];
        let b = &points[pos];
        let span = b.values.distance_m - a.values.distance_m;
        let into = relative - a.values.distance_m;
        let t = if span > 0.0 { into / span } else { 0.0 };
        let heading = bearing(a.lat, a.lon, b.lat, b.lon);
        let (lat, lon) = offset_by_bearing(a.lat, a.lon, into, heading);
        let altitude = a.altitude_m() + (b.altitude_m() - a.altitude_m()) * t;
        let mut values = a.values.lerp(&b.values, t) + segment.start();
        values.distance_m = distance_m;

        Some(SearchResult {
            index: TrackIndex::new(segment_index, pos - 1),
            point: b.with_position(lat, lon, altitude, values),
            exact: false,
        })
    }

    fn owning_segment(&self, distance_m: f64) -> Option<(usize, &Segment)> {
        if !distance_m.is_finite() || distance_m < 0.0 {
            return None;
        }
        if distance_m > self.total().distance_m + 1e-9 {
            return None;
        }
        // A route has at most a few hundred sections, so a scan is fine here.
        let mut owner = None;
        for (i, segment) in self.segments.linked().enumerate() {
            if segment.is_empty() {
                continue;
            }
            if segment.start().distance_m <= distance_m {
                owner = Some((i, segment));
            } else {
                break;
            }
        }
        owner
    }

    /// Lazy (distance, altitude) samples between `from` and `to`, at least
    /// `step` meters apart. A non-positive step yields every point.
    pub fn enumerate(&self, from_m: f64, to_m: f64, step_m: f64) -> ProfileIter<'_> {
        ProfileIter::new(&self.segments, from_m, to_m, step_m)
    }

    /// File split position for `distance_m`.
    pub fn file_position(&self, distance_m: f64) -> Option<FilePosition> {
        let total = self.total().distance_m;
        if !distance_m.is_finite() || distance_m < 0.0 || distance_m > total + 1e-9 {
            return None;
        }

        let mut file_index = 0;
        let mut next_split = None;
        for (i, segment) in self.segments.linked().enumerate() {
            if i == 0 || !segment.starts_file() {
                continue;
            }
            let split_at = segment.start().distance_m;
            if split_at <= distance_m {
                file_index += 1;
            } else {
                next_split = Some(split_at);
                break;
            }
        }

        Some(FilePosition {
            file_index,
            remaining_m: next_split.unwrap_or(total) - distance_m,
        })
    }

    pub fn stats(&self) -> RouteStats {
        let total = self.total();
        let mut stats = RouteStats {
            distance_m: total.distance_m,
            time_s: total.time_s,
            ascent_m: total.ascent_m,
            descent_m: total.descent_m,
            point_count: self.len(),
            segment_count: self.segments.len(),
            linked_segments: self.segments.linked_count(),
            ..Default::default()
        };

        for segment in self.segments.iter() {
            if matches!(segment.result(), Some(result) if !result.is_valid()) {
                stats.invalid_segments += 1;
            }
        }

        for segment in self.segments.linked() {
            for point in segment.points() {
                let altitude = point.altitude_m();
                stats.min_altitude_m = Some(stats.min_altitude_m.map_or(altitude, |m| m.min(altitude)));
                stats.max_altitude_m = Some(stats.max_altitude_m.map_or(altitude, |m| m.max(altitude)));
            }
        }
        stats
    }

    /// Assert Total and offset invariants.
    pub fn check_invariants(&self) {
        self.segments.check_invariants();
    }
}

/// Restartable (distance, altitude) iterator across segment boundaries.
#[derive(Debug, Clone)]
pub struct ProfileIter<'a> {
    segments: &'a SegmentCollection,
    from_m: f64,
    to_m: f64,
    step_m: f64,
    segment: usize,
    point: usize,
    next_at: f64,
    done: bool,
}

impl<'a> ProfileIter<'a> {
    fn new(segments: &'a SegmentCollection, from_m: f64, to_m: f64, step_m: f64) -> Self {
        let mut iter = Self {
            segments,
            from_m,
            to_m,
            step_m: if step_m.is_finite() { step_m.max(0.0) } else { 0.0 },
            segment: 0,
            point: 0,
            next_at: from_m,
            done: false,
        };
        iter.restart();
        iter
    }

    /// Rewind to the first sample at or after `from`.
    pub fn restart(&mut self) {
        self.segment = 0;
        self.point = 0;
        self.next_at = self.from_m;
        self.done = !(self.from_m.is_finite() && self.to_m.is_finite()) || self.to_m < self.from_m;

        for (i, segment) in self.segments.linked().enumerate() {
            if segment.end().distance_m >= self.from_m {
                let relative = self.from_m - segment.start().distance_m;
                self.segment = i;
                self.point = segment
                    .points()
                    .partition_point(|p| p.values.distance_m < relative);
                return;
            }
        }
        self.done = true;
    }
}

impl Iterator for ProfileIter<'_> {
    type Item = (f64, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let Some(segment) = self.segments.get(self.segment).filter(|s| s.is_linked()) else {
                self.done = true;
                break;
            };
            let Some(point) = segment.points().get(self.point) else {
                self.segment += 1;
                self.point = 0;
                continue;
            };
            self.point += 1;

            let distance = segment.start().distance_m + point.values.distance_m;
            if distance > self.to_m {
                self.done = true;
                break;
            }
            if distance < self.next_at {
                continue;
            }
            self.next_at = if self.step_m > 0.0 {
                distance + self.step_m
            } else {
                distance
            };
            return Some((distance, point.altitude_m()));
        }
        None
    }
}
