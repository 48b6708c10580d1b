//! Velo Core - route model for the cycle planner.
//!
//! Pure data and math: converting router samples to track points, the linked
//! segment collection and the point index consumed by renderers.

pub mod compare;
pub mod convert;
pub mod models;
pub mod poi;
pub mod points;
pub mod segment;
pub mod spatial;

pub use compare::{CompareError, CompareSession, DifferenceRegion};
pub use convert::{convert_samples, direct_samples, ElevationAccumulator, ELEVATION_DEADBAND_M};
pub use models::{
    CommonValues, CostProfile, LatLon, NoGoArea, RawSample, RouteData, RouteResult, SectionId,
    SurfaceRun, TrackIndex, TrackPoint, Waypoint, WaypointId,
};
pub use poi::{Poi, PoiId, PoiTracker};
pub use points::{FilePosition, PointCollection, ProfileIter, RouteStats, SearchResult};
pub use segment::{Segment, SegmentCollection};
pub use spatial::{bearing, haversine_distance, offset_by_bearing};
