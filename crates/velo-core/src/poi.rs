//! On-track markers for points of interest.
//!
//! Every POI keeps the set of sections whose path passes within its capture
//! radius. The marker is shown while that set is non-empty and disappears
//! once the last backing section is recalculated away or removed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{LatLon, SectionId, TrackIndex, TrackPoint};
use crate::segment::SegmentCollection;
use crate::spatial::distance_to_segment_m;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoiId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poi {
    pub name: String,
    pub location: LatLon,
    pub capture_radius_m: f64,
}

/// Closest approach of one section to a POI.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Projection {
    point_index: usize,
    offset_m: f64,
}

#[derive(Debug, Clone)]
struct PoiEntry {
    poi: Poi,
    projections: HashMap<SectionId, Projection>,
}

#[derive(Debug, Clone, Default)]
pub struct PoiTracker {
    entries: HashMap<PoiId, PoiEntry>,
    next_id: u64,
}

impl PoiTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a POI and project it onto every resolved segment.
    pub fn add(&mut self, poi: Poi, segments: &SegmentCollection) -> PoiId {
        let id = PoiId(self.next_id);
        self.next_id += 1;
        let mut entry = PoiEntry {
            poi,
            projections: HashMap::new(),
        };
        for segment in segments.iter() {
            if let Some(projection) = project(&entry.poi, segment.points()) {
                entry.projections.insert(segment.section(), projection);
            }
        }
        self.entries.insert(id, entry);
        id
    }

    pub fn remove(&mut self, id: PoiId) -> Option<Poi> {
        self.entries.remove(&id).map(|entry| entry.poi)
    }

    pub fn get(&self, id: PoiId) -> Option<&Poi> {
        self.entries.get(&id).map(|entry| &entry.poi)
    }

    /// Re-project all POIs after `section` got new points.
    pub fn refresh_section(&mut self, section: SectionId, points: &[TrackPoint]) {
        for entry in self.entries.values_mut() {
            match project(&entry.poi, points) {
                Some(projection) => {
                    entry.projections.insert(section, projection);
                }
                None => {
                    entry.projections.remove(&section);
                }
            }
        }
    }

    /// Forget every projection backed by `section`.
    pub fn drop_section(&mut self, section: SectionId) {
        for entry in self.entries.values_mut() {
            entry.projections.remove(&section);
        }
    }

    pub fn is_on_track(&self, id: PoiId) -> bool {
        self.entries
            .get(&id)
            .map(|entry| !entry.projections.is_empty())
            .unwrap_or(false)
    }

    pub fn on_track(&self) -> Vec<PoiId> {
        let mut ids: Vec<PoiId> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.projections.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Marker position: the closest projection, ties broken by route order.
    pub fn marker(&self, id: PoiId, segments: &SegmentCollection) -> Option<TrackIndex> {
        let entry = self.entries.get(&id)?;
        entry
            .projections
            .iter()
            .filter_map(|(section, projection)| {
                segments
                    .index_of(*section)
                    .map(|index| (TrackIndex::new(index, projection.point_index), projection.offset_m))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(index, _)| index)
    }
}

/// Closest approach of the path to a POI. Straight stretches between samples
/// count, so two-point direct sections still pass POIs on their line.
fn project(poi: &Poi, points: &[TrackPoint]) -> Option<Projection> {
    let at = poi.location;
    let nearest = match points {
        [] => return None,
        [only] => Projection {
            point_index: 0,
            offset_m: at.distance_to(&only.location()),
        },
        _ => points
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let (a, b) = (&pair[0], &pair[1]);
                let offset_m = distance_to_segment_m(at.lat, at.lon, a.lat, a.lon, b.lat, b.lon);
                let point_index = if at.distance_to(&a.location()) <= at.distance_to(&b.location()) {
                    i
                } else {
                    i + 1
                };
                Projection {
                    point_index,
                    offset_m,
                }
            })
            .min_by(|a, b| a.offset_m.total_cmp(&b.offset_m))?,
    };
    (nearest.offset_m <= poi.capture_radius_m).then_some(nearest)
}
