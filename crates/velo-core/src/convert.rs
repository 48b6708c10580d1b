//! Conversion of raw router samples into cumulative-metric track points.
//!
//! Everything in here is a pure function of its input, so the same samples
//! always produce bit-identical point arrays.

use crate::models::{CommonValues, RawSample, RouteData, RouteResult, SurfaceRun, TrackPoint};
use crate::spatial::{bearing_deg, haversine_distance};

/// Elevation changes smaller than this are treated as sensor/DEM noise.
pub const ELEVATION_DEADBAND_M: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Trend {
    #[default]
    Flat,
    Rising,
    Falling,
}

/// Noise-filtering ascent/descent counter.
///
/// A climb (or drop) is only committed once the altitude has moved back by the
/// deadband in the opposing direction, or when the track ends. Wobble inside
/// the deadband never reaches the totals.
#[derive(Debug, Clone, Default)]
pub struct ElevationAccumulator {
    anchor: Option<f64>,
    extreme: f64,
    trend: Trend,
    ascent_m: f64,
    descent_m: f64,
    deadband_m: f64,
}

impl ElevationAccumulator {
    pub fn new() -> Self {
        Self::with_deadband(ELEVATION_DEADBAND_M)
    }

    pub fn with_deadband(deadband_m: f64) -> Self {
        Self {
            deadband_m: deadband_m.max(0.0),
            ..Default::default()
        }
    }

    pub fn push(&mut self, altitude_m: f64) {
        if !altitude_m.is_finite() {
            return;
        }
        let Some(anchor) = self.anchor else {
            self.anchor = Some(altitude_m);
            self.extreme = altitude_m;
            return;
        };

        match self.trend {
            Trend::Flat => {
                if altitude_m - anchor >= self.deadband_m {
                    self.trend = Trend::Rising;
                    self.extreme = altitude_m;
                } else if anchor - altitude_m >= self.deadband_m {
                    self.trend = Trend::Falling;
                    self.extreme = altitude_m;
                }
            }
            Trend::Rising => {
                if altitude_m > self.extreme {
                    self.extreme = altitude_m;
                } else if self.extreme - altitude_m >= self.deadband_m {
                    self.ascent_m += self.extreme - anchor;
                    self.anchor = Some(self.extreme);
                    self.trend = Trend::Falling;
                    self.extreme = altitude_m;
                }
            }
            Trend::Falling => {
                if altitude_m < self.extreme {
                    self.extreme = altitude_m;
                } else if altitude_m - self.extreme >= self.deadband_m {
                    self.descent_m += anchor - self.extreme;
                    self.anchor = Some(self.extreme);
                    self.trend = Trend::Rising;
                    self.extreme = altitude_m;
                }
            }
        }
    }

    /// Commit the pending run. Called once at the end of a track.
    pub fn finish(&mut self) {
        let Some(anchor) = self.anchor else {
            return;
        };
        match self.trend {
            Trend::Rising => self.ascent_m += self.extreme - anchor,
            Trend::Falling => self.descent_m += anchor - self.extreme,
            Trend::Flat => return,
        }
        self.anchor = Some(self.extreme);
        self.trend = Trend::Flat;
    }

    pub fn ascent_m(&self) -> f64 {
        self.ascent_m
    }

    pub fn descent_m(&self) -> f64 {
        self.descent_m
    }
}

/// Convert router samples into track points with cumulative values.
///
/// An empty sample list yields [`RouteResult::Invalid`].
pub fn convert_samples(samples: &[RawSample]) -> RouteResult {
    let Some(first) = samples.first() else {
        return RouteResult::Invalid;
    };

    let mut points = Vec::with_capacity(samples.len());
    let mut surfaces: Vec<SurfaceRun> = Vec::new();
    let mut elevation = ElevationAccumulator::new();
    let mut values = CommonValues::ZERO;

    let mut heading = samples
        .get(1)
        .map(|next| bearing_deg(first.lat, first.lon, next.lat, next.lon))
        .unwrap_or(0.0);
    elevation.push(first.altitude_m);
    if samples.len() == 1 {
        elevation.finish();
    }
    push_surface(&mut surfaces, 0, first);
    points.push(TrackPoint::new(
        first.lat,
        first.lon,
        first.altitude_m,
        heading,
        0.0,
        0.0,
        values,
    ));

    let last_index = samples.len() - 1;
    for (index, pair) in samples.windows(2).enumerate() {
        let (prev, cur) = (&pair[0], &pair[1]);
        let distance = haversine_distance(prev.lat, prev.lon, cur.lat, cur.lon);
        let elapsed = (cur.time_s - prev.time_s).max(0.0);

        if distance > 0.0 {
            heading = bearing_deg(prev.lat, prev.lon, cur.lat, cur.lon);
        }
        let gradient = if distance > 0.0 {
            (cur.altitude_m - prev.altitude_m) / distance * 100.0
        } else {
            0.0
        };
        let speed = if elapsed > 0.0 { distance / elapsed } else { 0.0 };

        elevation.push(cur.altitude_m);
        if index + 1 == last_index {
            elevation.finish();
        }

        values = CommonValues {
            distance_m: values.distance_m + distance,
            time_s: values.time_s + elapsed,
            ascent_m: elevation.ascent_m(),
            descent_m: elevation.descent_m(),
        };
        push_surface(&mut surfaces, index + 1, cur);
        points.push(TrackPoint::new(
            cur.lat,
            cur.lon,
            cur.altitude_m,
            heading,
            gradient,
            speed,
            values,
        ));
    }

    RouteResult::from_data(RouteData { points, surfaces })
}

fn push_surface(runs: &mut Vec<SurfaceRun>, index: usize, sample: &RawSample) {
    let Some(surface) = sample.surface.as_deref() else {
        return;
    };
    if runs.last().map(|run| run.surface.as_str()) == Some(surface) {
        return;
    }
    runs.push(SurfaceRun {
        start_index: index,
        surface: surface.to_string(),
    });
}

/// Two-sample straight path between snapped endpoints at an assumed speed.
pub fn direct_samples(start: &RawSample, end: &RawSample, speed_mps: f64) -> Vec<RawSample> {
    let distance = haversine_distance(start.lat, start.lon, end.lat, end.lon);
    let duration = if speed_mps > 0.0 { distance / speed_mps } else { 0.0 };
    vec![
        RawSample::new(start.lat, start.lon, start.altitude_m, 0.0),
        RawSample::new(end.lat, end.lon, end.altitude_m, duration),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(altitudes: &[f64]) -> Vec<RawSample> {
        altitudes
            .iter()
            .enumerate()
            .map(|(i, alt)| RawSample::new(47.0, 8.0 + i as f64 * 0.001, *alt, i as f64 * 10.0))
            .collect()
    }

    #[test]
    fn small_drop_inside_deadband_is_not_descent() {
        let result = convert_samples(&samples(&[100.0, 100.0, 95.0]));
        let last = result.points().last().unwrap();
        assert_eq!(last.values.descent_m, 0.0);
        assert_eq!(last.values.ascent_m, 0.0);
    }

    #[test]
    fn climb_is_committed_on_reversal_and_drop_at_the_end() {
        let result = convert_samples(&samples(&[100.0, 120.0, 130.0, 125.0, 110.0, 90.0]));
        let points = result.points();
        // Climb is only known once the altitude fell back by the deadband.
        assert_eq!(points[3].values.ascent_m, 0.0);
        assert_eq!(points[4].values.ascent_m, 30.0);
        let last = points.last().unwrap();
        assert_eq!(last.values.ascent_m, 30.0);
        assert_eq!(last.values.descent_m, 40.0);
    }

    #[test]
    fn jitter_does_not_inflate_totals() {
        let mut acc = ElevationAccumulator::new();
        for alt in [200.0, 204.0, 197.0, 205.0, 196.0, 203.0] {
            acc.push(alt);
        }
        acc.finish();
        assert_eq!(acc.ascent_m(), 0.0);
        assert_eq!(acc.descent_m(), 0.0);
    }

    #[test]
    fn distance_is_haversine_accumulated() {
        let input = samples(&[400.0, 401.0, 402.0, 403.0]);
        let result = convert_samples(&input);
        let expected: f64 = input
            .windows(2)
            .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
            .sum();
        assert_eq!(result.values().distance_m, expected);
        assert_eq!(result.values().time_s, 30.0);
        assert!((result.points()[1].heading_deg() - 90.0).abs() < 0.1);
        assert!(result.points()[1].speed_mps() > 7.0);
    }

    #[test]
    fn conversion_is_idempotent() {
        let input = samples(&[350.0, 362.5, 340.0, 371.0, 365.0]);
        assert_eq!(convert_samples(&input), convert_samples(&input));
    }

    #[test]
    fn empty_samples_are_invalid() {
        assert!(!convert_samples(&[]).is_valid());
        let single = convert_samples(&samples(&[12.0]));
        assert_eq!(single.len(), 1);
        assert_eq!(single.values(), CommonValues::ZERO);
    }

    #[test]
    fn surface_runs_collapse_repeated_tags() {
        let mut input = samples(&[1.0, 1.0, 1.0, 1.0]);
        input[0].surface = Some("asphalt".into());
        input[1].surface = Some("asphalt".into());
        input[2].surface = Some("gravel".into());
        let result = convert_samples(&input);
        let runs = &result.data().unwrap().surfaces;
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].start_index, 2);
        assert_eq!(runs[1].surface, "gravel");
    }

    #[test]
    fn direct_samples_use_the_assumed_speed() {
        let a = RawSample::new(0.0, 0.0, 10.0, 0.0);
        let b = RawSample::new(0.0, 0.01, 20.0, 0.0);
        let path = direct_samples(&a, &b, 5.0);
        let distance = haversine_distance(0.0, 0.0, 0.0, 0.01);
        assert_eq!(path.len(), 2);
        assert!((path[1].time_s - distance / 5.0).abs() < 1e-9);
    }
}
