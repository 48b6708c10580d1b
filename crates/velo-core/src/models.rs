//! Core data models for the route graph.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::Arc;

use crate::spatial::haversine_distance;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to `other` in meters.
    pub fn distance_to(&self, other: &LatLon) -> f64 {
        haversine_distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Stable handle of a waypoint inside the builder's arena.
///
/// Handles are never reused, so they stay valid map keys across in-place moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WaypointId(pub u64);

impl fmt::Display for WaypointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wp#{}", self.0)
    }
}

/// Identity of one route section. A replaced section always gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(pub u64);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "section#{}", self.0)
    }
}

/// A user-placed anchor of the route.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub location: LatLon,
    /// The section ending at this waypoint is drawn as a straight line.
    #[serde(default)]
    pub is_direct_route: bool,
    /// A new output file starts at this waypoint.
    #[serde(default)]
    pub is_file_split: bool,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            location: LatLon::new(lat, lon),
            is_direct_route: false,
            is_file_split: false,
        }
    }

    pub fn direct(mut self) -> Self {
        self.is_direct_route = true;
        self
    }
}

/// Circular exclusion zone the router must avoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoGoArea {
    pub center: LatLon,
    pub radius_m: f64,
}

impl NoGoArea {
    pub fn new(lat: f64, lon: f64, radius_m: f64) -> Self {
        Self {
            center: LatLon::new(lat, lon),
            radius_m,
        }
    }

    pub fn contains(&self, point: &LatLon) -> bool {
        self.center.distance_to(point) <= self.radius_m
    }
}

/// The five routing cost parameters exposed to the user.
///
/// Integer valued so profiles compare and hash by value; cutoffs are in
/// tenths of a percent of gradient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CostProfile {
    pub uphill_cost: u32,
    pub uphill_cutoff: u32,
    pub downhill_cost: u32,
    pub downhill_cutoff: u32,
    pub turn_cost: u32,
}

impl Default for CostProfile {
    fn default() -> Self {
        Self {
            uphill_cost: 80,
            uphill_cutoff: 15,
            downhill_cost: 60,
            downhill_cutoff: 15,
            turn_cost: 90,
        }
    }
}

/// One sample as returned by the routing backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f64,
    /// Seconds since the first sample of the section.
    pub time_s: f64,
    #[serde(default)]
    pub surface: Option<String>,
}

impl RawSample {
    pub fn new(lat: f64, lon: f64, altitude_m: f64, time_s: f64) -> Self {
        Self {
            lat,
            lon,
            altitude_m,
            time_s,
            surface: None,
        }
    }
}

/// Additive per-point metrics. A segment's values are those of its last point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonValues {
    pub distance_m: f64,
    pub time_s: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
}

impl CommonValues {
    pub const ZERO: CommonValues = CommonValues {
        distance_m: 0.0,
        time_s: 0.0,
        ascent_m: 0.0,
        descent_m: 0.0,
    };

    /// Linear blend between `self` and `other`, `t` in [0, 1].
    pub fn lerp(&self, other: &CommonValues, t: f64) -> CommonValues {
        CommonValues {
            distance_m: self.distance_m + (other.distance_m - self.distance_m) * t,
            time_s: self.time_s + (other.time_s - self.time_s) * t,
            ascent_m: self.ascent_m + (other.ascent_m - self.ascent_m) * t,
            descent_m: self.descent_m + (other.descent_m - self.descent_m) * t,
        }
    }
}

impl Add for CommonValues {
    type Output = CommonValues;

    fn add(self, rhs: CommonValues) -> CommonValues {
        CommonValues {
            distance_m: self.distance_m + rhs.distance_m,
            time_s: self.time_s + rhs.time_s,
            ascent_m: self.ascent_m + rhs.ascent_m,
            descent_m: self.descent_m + rhs.descent_m,
        }
    }
}

impl Sub for CommonValues {
    type Output = CommonValues;

    fn sub(self, rhs: CommonValues) -> CommonValues {
        CommonValues {
            distance_m: self.distance_m - rhs.distance_m,
            time_s: self.time_s - rhs.time_s,
            ascent_m: self.ascent_m - rhs.ascent_m,
            descent_m: self.descent_m - rhs.descent_m,
        }
    }
}

impl AddAssign for CommonValues {
    fn add_assign(&mut self, rhs: CommonValues) {
        *self = *self + rhs;
    }
}

impl SubAssign for CommonValues {
    fn sub_assign(&mut self, rhs: CommonValues) {
        *self = *self - rhs;
    }
}

/// One sample of the final route.
///
/// Altitude, heading, gradient and speed are kept in fixed point to keep long
/// tracks compact: decimetres, tenths of a degree, tenths of a percent and
/// centimetres per second respectively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    altitude_dm: i32,
    heading_dd: u16,
    gradient_pm: i16,
    speed_cms: u16,
    pub values: CommonValues,
}

impl TrackPoint {
    pub fn new(
        lat: f64,
        lon: f64,
        altitude_m: f64,
        heading_deg: f64,
        gradient_pct: f64,
        speed_mps: f64,
        values: CommonValues,
    ) -> Self {
        Self {
            lat,
            lon,
            altitude_dm: encode_altitude(altitude_m),
            heading_dd: encode_heading(heading_deg),
            gradient_pm: encode_gradient(gradient_pct),
            speed_cms: encode_speed(speed_mps),
            values,
        }
    }

    pub fn location(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }

    pub fn altitude_m(&self) -> f64 {
        self.altitude_dm as f64 / 10.0
    }

    /// Initial bearing from the previous point, degrees in [0, 360).
    pub fn heading_deg(&self) -> f64 {
        self.heading_dd as f64 / 10.0
    }

    pub fn gradient_pct(&self) -> f64 {
        self.gradient_pm as f64 / 10.0
    }

    pub fn speed_mps(&self) -> f64 {
        self.speed_cms as f64 / 100.0
    }

    /// Copy of this point with `offset` added to its common values.
    pub fn shifted(&self, offset: &CommonValues) -> TrackPoint {
        TrackPoint {
            values: self.values + *offset,
            ..*self
        }
    }

    pub(crate) fn with_position(&self, lat: f64, lon: f64, altitude_m: f64, values: CommonValues) -> TrackPoint {
        TrackPoint {
            lat,
            lon,
            altitude_dm: encode_altitude(altitude_m),
            values,
            ..*self
        }
    }
}

fn encode_altitude(altitude_m: f64) -> i32 {
    if !altitude_m.is_finite() {
        return 0;
    }
    (altitude_m * 10.0).round() as i32
}

fn encode_heading(heading_deg: f64) -> u16 {
    if !heading_deg.is_finite() {
        return 0;
    }
    let tenths = (heading_deg.rem_euclid(360.0) * 10.0).round() as u32;
    (tenths % 3600) as u16
}

fn encode_gradient(gradient_pct: f64) -> i16 {
    if !gradient_pct.is_finite() {
        return 0;
    }
    (gradient_pct * 10.0)
        .round()
        .clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn encode_speed(speed_mps: f64) -> u16 {
    if !speed_mps.is_finite() {
        return 0;
    }
    (speed_mps * 100.0).round().clamp(0.0, u16::MAX as f64) as u16
}

/// A run of samples sharing one surface tag, starting at `start_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRun {
    pub start_index: usize,
    pub surface: String,
}

/// Converted points of one section plus their surface runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteData {
    pub points: Vec<TrackPoint>,
    #[serde(default)]
    pub surfaces: Vec<SurfaceRun>,
}

/// Outcome of a section calculation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RouteResult {
    /// The router gave up on this section; the route stays usable around it.
    #[default]
    Invalid,
    Valid(Arc<RouteData>),
}

impl RouteResult {
    pub fn from_points(points: Vec<TrackPoint>) -> Self {
        Self::from_data(RouteData {
            points,
            surfaces: Vec::new(),
        })
    }

    pub fn from_data(data: RouteData) -> Self {
        if data.points.is_empty() {
            RouteResult::Invalid
        } else {
            RouteResult::Valid(Arc::new(data))
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, RouteResult::Valid(_))
    }

    pub fn points(&self) -> &[TrackPoint] {
        match self {
            RouteResult::Valid(data) => &data.points,
            RouteResult::Invalid => &[],
        }
    }

    pub fn data(&self) -> Option<&RouteData> {
        match self {
            RouteResult::Valid(data) => Some(data),
            RouteResult::Invalid => None,
        }
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    /// Common values of the last point, zero for an invalid result.
    pub fn values(&self) -> CommonValues {
        self.points()
            .last()
            .map(|point| point.values)
            .unwrap_or(CommonValues::ZERO)
    }
}

/// Global address of a point: (segment index, point index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackIndex {
    pub segment: i32,
    pub point: i32,
}

impl TrackIndex {
    pub const INVALID: TrackIndex = TrackIndex {
        segment: -1,
        point: -1,
    };

    pub fn new(segment: usize, point: usize) -> Self {
        Self {
            segment: segment as i32,
            point: point as i32,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.segment >= 0 && self.point >= 0
    }
}

impl Default for TrackIndex {
    fn default() -> Self {
        TrackIndex::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_point_fixed_point_round_trips_within_precision() {
        let point = TrackPoint::new(47.0, 8.0, 412.34, 359.97, -7.26, 5.556, CommonValues::ZERO);
        assert!((point.altitude_m() - 412.3).abs() < 1e-9);
        // 359.97 rounds to 3600 tenths which wraps to north
        assert_eq!(point.heading_deg(), 0.0);
        assert!((point.gradient_pct() + 7.3).abs() < 1e-9);
        assert!((point.speed_mps() - 5.56).abs() < 1e-9);
    }

    #[test]
    fn gradient_saturates_instead_of_wrapping() {
        let point = TrackPoint::new(0.0, 0.0, 0.0, 0.0, 10_000.0, -3.0, CommonValues::ZERO);
        assert_eq!(point.gradient_pct(), i16::MAX as f64 / 10.0);
        assert_eq!(point.speed_mps(), 0.0);
    }

    #[test]
    fn common_values_are_additive() {
        let a = CommonValues {
            distance_m: 10.0,
            time_s: 2.0,
            ascent_m: 1.0,
            descent_m: 0.5,
        };
        let b = CommonValues {
            distance_m: 5.0,
            time_s: 1.0,
            ascent_m: 0.0,
            descent_m: 2.0,
        };
        let sum = a + b;
        assert_eq!(sum.distance_m, 15.0);
        assert_eq!(sum - b, a);
    }

    #[test]
    fn empty_points_make_an_invalid_result() {
        assert_eq!(RouteResult::from_points(Vec::new()), RouteResult::Invalid);
        assert_eq!(RouteResult::Invalid.values(), CommonValues::ZERO);
        assert!(!TrackIndex::INVALID.is_valid());
    }

    #[test]
    fn route_data_survives_json_with_fixed_point_intact() {
        let values = CommonValues {
            distance_m: 1234.5,
            time_s: 300.0,
            ascent_m: 12.0,
            descent_m: 3.0,
        };
        let data = RouteData {
            points: vec![
                TrackPoint::new(47.0, 8.0, 412.3, 90.0, 2.5, 4.2, CommonValues::ZERO),
                TrackPoint::new(47.001, 8.01, 421.7, 87.5, -1.3, 5.1, values),
            ],
            surfaces: vec![SurfaceRun {
                start_index: 1,
                surface: "gravel".into(),
            }],
        };

        let json = serde_json::to_string(&data).unwrap();
        let back: RouteData = serde_json::from_str(&json).unwrap();
        assert_eq!(back.surfaces, data.surfaces);
        for (a, b) in back.points.iter().zip(&data.points) {
            assert!((a.lat - b.lat).abs() < 1e-12);
            assert!((a.lon - b.lon).abs() < 1e-12);
            assert_eq!(a.altitude_m(), b.altitude_m());
            assert_eq!(a.heading_deg(), b.heading_deg());
            assert_eq!(a.gradient_pct(), b.gradient_pct());
            assert_eq!(a.speed_mps(), b.speed_mps());
            assert!((a.values.distance_m - b.values.distance_m).abs() < 1e-9);
        }

        let bare: RouteData = serde_json::from_str(r#"{"points":[]}"#).unwrap();
        assert!(bare.surfaces.is_empty());
    }
}
