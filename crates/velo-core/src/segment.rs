//! Segments: the materialized point arrays backing route sections.
//!
//! Segments are kept in section order. The resolved prefix of the list is
//! "linked": every linked segment knows its cumulative start values and the
//! global index of its first point. The first unresolved segment breaks the
//! chain and everything after it stays unlinked until it resolves.

use crate::models::{CommonValues, RouteResult, SectionId, TrackPoint};

#[derive(Debug, Clone)]
pub struct Segment {
    section: SectionId,
    result: Option<RouteResult>,
    start: CommonValues,
    point_offset: usize,
    linked: bool,
    starts_file: bool,
}

impl Segment {
    pub fn new(section: SectionId) -> Self {
        Self {
            section,
            result: None,
            start: CommonValues::ZERO,
            point_offset: 0,
            linked: false,
            starts_file: false,
        }
    }

    pub fn section(&self) -> SectionId {
        self.section
    }

    /// Whether the section calculation has delivered a result (valid or not).
    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&RouteResult> {
        self.result.as_ref()
    }

    /// Points relative to the segment start.
    pub fn points(&self) -> &[TrackPoint] {
        self.result.as_ref().map(|r| r.points()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    /// This segment's own contribution: the values of its last point.
    pub fn values(&self) -> CommonValues {
        self.result
            .as_ref()
            .map(|r| r.values())
            .unwrap_or(CommonValues::ZERO)
    }

    /// Cumulative values at the first point. Only meaningful while linked.
    pub fn start(&self) -> CommonValues {
        self.start
    }

    pub fn end(&self) -> CommonValues {
        self.start + self.values()
    }

    /// Global index of the first point. Only meaningful while linked.
    pub fn point_offset(&self) -> usize {
        self.point_offset
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    /// A new output file starts at the first point of this segment.
    pub fn starts_file(&self) -> bool {
        self.starts_file
    }

    /// Point `index` with cumulative route values.
    pub fn global_point(&self, index: usize) -> Option<TrackPoint> {
        self.points().get(index).map(|p| p.shifted(&self.start))
    }
}

/// Ordered segments with a running total over the linked prefix.
#[derive(Debug, Clone, Default)]
pub struct SegmentCollection {
    segments: Vec<Segment>,
    total: CommonValues,
    total_points: usize,
}

impl SegmentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Segment> {
        self.segments.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    /// The linked prefix, in order.
    pub fn linked(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter().take_while(|s| s.linked)
    }

    pub fn linked_count(&self) -> usize {
        self.linked().count()
    }

    /// Sum of the values of all linked segments.
    pub fn total(&self) -> CommonValues {
        self.total
    }

    /// Number of globally addressable points.
    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn index_of(&self, section: SectionId) -> Option<usize> {
        self.segments.iter().position(|s| s.section == section)
    }

    /// Splice an unresolved segment for `section` at `index`.
    ///
    /// # Panics
    /// If `index` is past the end or the section is already present.
    pub fn insert(&mut self, index: usize, section: SectionId) {
        assert!(
            index <= self.segments.len(),
            "segment insert index {index} out of range (len {})",
            self.segments.len()
        );
        assert!(
            self.index_of(section).is_none(),
            "{section} already has a segment"
        );
        self.segments.insert(index, Segment::new(section));
        self.relink_from(index);
        self.debug_check();
    }

    /// Replace the points of `section` and relink what follows.
    ///
    /// # Panics
    /// If the section has no segment.
    pub fn update(&mut self, section: SectionId, result: RouteResult) -> usize {
        let index = self
            .index_of(section)
            .unwrap_or_else(|| panic!("update of unknown {section}"));
        self.update_at(index, result);
        index
    }

    /// Replace the points of the segment at `index` and relink what follows.
    pub fn update_at(&mut self, index: usize, result: RouteResult) {
        self.detach(index);
        self.segments[index].result = Some(result);
        self.relink_from(index);
        self.debug_check();
    }

    /// Remove the segment at `index`, returning it.
    pub fn remove_at(&mut self, index: usize) -> Segment {
        assert!(
            index < self.segments.len(),
            "segment remove index {index} out of range (len {})",
            self.segments.len()
        );
        self.detach(index);
        let removed = self.segments.remove(index);
        if index < self.segments.len() {
            self.relink_from(index);
        }
        self.debug_check();
        removed
    }

    /// Remove the segment of `section`.
    ///
    /// # Panics
    /// If the section has no segment: that is a bookkeeping bug in the caller.
    pub fn remove(&mut self, section: SectionId) -> Segment {
        let index = self
            .index_of(section)
            .unwrap_or_else(|| panic!("removal of unknown {section}"));
        self.remove_at(index)
    }

    pub fn set_starts_file(&mut self, index: usize, starts_file: bool) {
        if let Some(segment) = self.segments.get_mut(index) {
            segment.starts_file = starts_file;
        }
    }

    /// Take a linked segment out of the totals.
    fn detach(&mut self, index: usize) {
        let segment = &mut self.segments[index];
        if segment.linked {
            self.total -= segment.values();
            self.total_points -= segment.len();
            segment.linked = false;
        }
    }

    /// Recompute link state from `index` on.
    ///
    /// Stops as soon as a linked segment keeps its start (nothing after it can
    /// change) or two consecutive segments stay unlinked.
    fn relink_from(&mut self, index: usize) {
        for i in index..self.segments.len() {
            let (pred_end, pred_points, pred_linked) = if i == 0 {
                (CommonValues::ZERO, 0, true)
            } else {
                let prev = &self.segments[i - 1];
                (prev.end(), prev.point_offset + prev.len(), prev.linked)
            };

            let segment = &mut self.segments[i];
            let was_linked = segment.linked;
            let should_link = pred_linked && segment.result.is_some();

            if should_link {
                let unchanged = was_linked
                    && segment.start == pred_end
                    && segment.point_offset == pred_points;
                if unchanged {
                    break;
                }
                if !was_linked {
                    self.total += segment.values();
                    self.total_points += segment.len();
                }
                segment.start = pred_end;
                segment.point_offset = pred_points;
                segment.linked = true;
            } else {
                if was_linked {
                    self.total -= segment.values();
                    self.total_points -= segment.len();
                }
                segment.linked = false;
                segment.start = CommonValues::ZERO;
                segment.point_offset = 0;
                let next_linked = self.segments.get(i + 1).map(|s| s.linked).unwrap_or(false);
                if !was_linked && !next_linked {
                    break;
                }
            }
        }
    }

    #[cfg(debug_assertions)]
    fn debug_check(&self) {
        self.check_invariants();
    }

    #[cfg(not(debug_assertions))]
    fn debug_check(&self) {}

    /// Assert the linking invariants. Panics on violation.
    pub fn check_invariants(&self) {
        let mut expected = CommonValues::ZERO;
        let mut points = 0usize;
        let mut in_prefix = true;
        for (i, segment) in self.segments.iter().enumerate() {
            if !segment.linked {
                in_prefix = false;
                continue;
            }
            assert!(in_prefix, "segment {i} linked after an unlinked segment");
            assert!(segment.is_resolved(), "segment {i} linked while unresolved");
            assert!(
                close(segment.start.distance_m, expected.distance_m),
                "segment {i} start {} != {}",
                segment.start.distance_m,
                expected.distance_m
            );
            assert_eq!(segment.point_offset, points, "segment {i} point offset");
            expected += segment.values();
            points += segment.len();
        }
        assert!(
            close(self.total.distance_m, expected.distance_m),
            "total distance {} != linked sum {}",
            self.total.distance_m,
            expected.distance_m
        );
        assert_eq!(self.total_points, points, "total point count");
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_samples;
    use crate::models::RawSample;

    fn line(start_lon: f64, count: usize) -> RouteResult {
        let samples: Vec<RawSample> = (0..count)
            .map(|i| RawSample::new(0.0, start_lon + i as f64 * 0.001, 10.0, i as f64))
            .collect();
        convert_samples(&samples)
    }

    fn collection(n: u64) -> SegmentCollection {
        let mut segments = SegmentCollection::new();
        for id in 0..n {
            segments.insert(id as usize, SectionId(id));
        }
        segments
    }

    #[test]
    fn in_order_updates_link_the_prefix() {
        let mut segments = collection(3);
        segments.update(SectionId(0), line(0.0, 3));
        segments.update(SectionId(1), line(0.002, 4));
        assert_eq!(segments.linked_count(), 2);
        let second = segments.get(1).unwrap();
        assert_eq!(second.point_offset(), 3);
        assert_eq!(second.start().distance_m, segments.get(0).unwrap().values().distance_m);
        assert_eq!(segments.total_points(), 7);
    }

    #[test]
    fn unresolved_segment_breaks_the_chain_until_it_resolves() {
        let mut segments = collection(3);
        segments.update(SectionId(2), line(0.01, 2));
        segments.update(SectionId(0), line(0.0, 2));
        assert_eq!(segments.linked_count(), 1);
        assert!(!segments.get(2).unwrap().is_linked());
        let before = segments.total().distance_m;

        segments.update(SectionId(1), line(0.005, 5));
        assert_eq!(segments.linked_count(), 3);
        let expected: f64 = segments.iter().map(|s| s.values().distance_m).sum();
        assert!((segments.total().distance_m - expected).abs() < 1e-6);
        assert!(segments.total().distance_m > before);
    }

    #[test]
    fn insert_unlinks_the_tail() {
        let mut segments = collection(2);
        segments.update(SectionId(0), line(0.0, 2));
        segments.update(SectionId(1), line(0.0, 2));
        segments.insert(1, SectionId(9));
        assert_eq!(segments.linked_count(), 1);
        assert!(!segments.get(2).unwrap().is_linked());
        let first = segments.get(0).unwrap().values().distance_m;
        assert!((segments.total().distance_m - first).abs() < 1e-9);
    }

    #[test]
    fn removing_the_first_segment_resets_offsets() {
        let mut segments = collection(2);
        segments.update(SectionId(0), line(0.0, 3));
        segments.update(SectionId(1), line(0.0, 4));
        segments.remove_at(0);
        let first = segments.get(0).unwrap();
        assert_eq!(first.start(), CommonValues::ZERO);
        assert_eq!(first.point_offset(), 0);
        assert_eq!(segments.total_points(), 4);
    }

    #[test]
    fn removing_an_unresolved_segment_relinks_the_tail() {
        let mut segments = collection(3);
        segments.update(SectionId(0), line(0.0, 2));
        segments.update(SectionId(2), line(0.0, 2));
        assert_eq!(segments.linked_count(), 1);
        segments.remove(SectionId(1));
        assert_eq!(segments.linked_count(), 2);
        assert_eq!(segments.get(1).unwrap().point_offset(), 2);
    }

    #[test]
    fn invalid_result_links_with_zero_contribution() {
        let mut segments = collection(2);
        segments.update(SectionId(0), RouteResult::Invalid);
        segments.update(SectionId(1), line(0.0, 3));
        assert_eq!(segments.linked_count(), 2);
        assert_eq!(segments.get(1).unwrap().start(), CommonValues::ZERO);
        assert_eq!(segments.total_points(), 3);
    }

    #[test]
    fn replacing_points_shifts_following_starts_by_the_delta() {
        let mut segments = collection(2);
        segments.update(SectionId(0), line(0.0, 3));
        segments.update(SectionId(1), line(0.0, 3));
        let old_start = segments.get(1).unwrap().start().distance_m;
        segments.update(SectionId(0), line(0.0, 6));
        let new_start = segments.get(1).unwrap().start().distance_m;
        assert!(new_start > old_start);
        assert_eq!(segments.get(1).unwrap().point_offset(), 6);
        segments.check_invariants();
    }

    #[test]
    #[should_panic(expected = "removal of unknown")]
    fn removing_unknown_section_is_fatal() {
        let mut segments = collection(1);
        segments.remove(SectionId(42));
    }
}
