//! Parsing of the backend's GeoJSON track response.

use serde::Deserialize;
use velo_core::RawSample;

use crate::error::RoutingError;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: Vec<Vec<f64>>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    /// Seconds since the first coordinate, one per coordinate.
    #[serde(default)]
    times: Vec<f64>,
    /// Table with a header row. Each row closes a way section at its
    /// Longitude/Latitude (microdegrees) and carries that way's tags.
    #[serde(default)]
    messages: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProfileUpload {
    #[serde(default)]
    pub profileid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Turn a GeoJSON track into raw samples.
pub fn parse_track(body: &str) -> Result<Vec<RawSample>, RoutingError> {
    let collection: FeatureCollection =
        serde_json::from_str(body).map_err(|e| RoutingError::Malformed(e.to_string()))?;
    let feature = collection
        .features
        .into_iter()
        .next()
        .ok_or(RoutingError::EmptyPath)?;

    let coordinates = &feature.geometry.coordinates;
    if coordinates.is_empty() {
        return Err(RoutingError::EmptyPath);
    }

    let mut samples = Vec::with_capacity(coordinates.len());
    for (i, coordinate) in coordinates.iter().enumerate() {
        let [lon, lat, rest @ ..] = coordinate.as_slice() else {
            return Err(RoutingError::Malformed(format!(
                "coordinate {i} has {} components",
                coordinate.len()
            )));
        };
        let altitude = rest.first().copied().unwrap_or(0.0);
        let time = feature.properties.times.get(i).copied().unwrap_or(0.0);
        samples.push(RawSample::new(*lat, *lon, altitude, time));
    }

    apply_surfaces(&mut samples, &feature.properties.messages);
    Ok(samples)
}

struct WayEnd {
    lon_micro: i64,
    lat_micro: i64,
    surface: Option<String>,
}

fn way_ends(messages: &[Vec<String>]) -> Vec<WayEnd> {
    let Some((header, rows)) = messages.split_first() else {
        return Vec::new();
    };
    let column = |name: &str| header.iter().position(|h| h == name);
    let (Some(lon_col), Some(lat_col), Some(tags_col)) =
        (column("Longitude"), column("Latitude"), column("WayTags"))
    else {
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| {
            let lon_micro = row.get(lon_col)?.parse().ok()?;
            let lat_micro = row.get(lat_col)?.parse().ok()?;
            let surface = row.get(tags_col).and_then(|tags| surface_tag(tags));
            Some(WayEnd {
                lon_micro,
                lat_micro,
                surface,
            })
        })
        .collect()
}

fn surface_tag(tags: &str) -> Option<String> {
    tags.split_whitespace()
        .find_map(|tag| tag.strip_prefix("surface="))
        .map(str::to_string)
}

/// Samples up to and including a row's end point take that row's surface.
fn apply_surfaces(samples: &mut [RawSample], messages: &[Vec<String>]) {
    let ends = way_ends(messages);
    let mut current = 0;
    for sample in samples.iter_mut() {
        let Some(end) = ends.get(current) else {
            break;
        };
        sample.surface = end.surface.clone();
        let lon_micro = (sample.lon * 1e6).round() as i64;
        let lat_micro = (sample.lat * 1e6).round() as i64;
        if lon_micro == end.lon_micro && lat_micro == end.lat_micro {
            current += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"{
      "type": "FeatureCollection",
      "features": [{
        "type": "Feature",
        "properties": {
          "times": [0, 12.5, 30.0],
          "messages": [
            ["Longitude", "Latitude", "Elevation", "Distance", "WayTags"],
            ["8001000", "47000000", "410", "75", "highway=cycleway surface=asphalt"],
            ["8002000", "47000000", "415", "76", "highway=track surface=gravel"]
          ]
        },
        "geometry": {
          "type": "LineString",
          "coordinates": [[8.0, 47.0, 400.0], [8.001, 47.0, 410.0], [8.002, 47.0]]
        }
      }]
    }"#;

    #[test]
    fn parses_coordinates_times_and_surfaces() {
        let samples = parse_track(TRACK).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1].lat, 47.0);
        assert_eq!(samples[1].lon, 8.001);
        assert_eq!(samples[1].time_s, 12.5);
        assert_eq!(samples[2].altitude_m, 0.0);
        assert_eq!(samples[0].surface.as_deref(), Some("asphalt"));
        assert_eq!(samples[1].surface.as_deref(), Some("asphalt"));
        assert_eq!(samples[2].surface.as_deref(), Some("gravel"));
    }

    #[test]
    fn empty_feature_list_is_an_empty_path() {
        let result = parse_track(r#"{"type":"FeatureCollection","features":[]}"#);
        assert!(matches!(result, Err(RoutingError::EmptyPath)));
    }

    #[test]
    fn short_coordinate_is_malformed() {
        let body = r#"{"features":[{"geometry":{"coordinates":[[8.0]]}}]}"#;
        assert!(matches!(parse_track(body), Err(RoutingError::Malformed(_))));
    }
}
