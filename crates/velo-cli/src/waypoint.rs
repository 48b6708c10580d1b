//! `lat,lon[,direct]` waypoint arguments.

use anyhow::{bail, Context, Result};
use velo_core::Waypoint;

/// Parse `lat,lon` or `lat,lon,direct`. A trailing `direct` makes the section
/// ending at this waypoint a straight line.
pub fn parse_waypoint(arg: &str) -> Result<Waypoint> {
    let parts: Vec<&str> = arg.split(',').map(str::trim).collect();
    let (lat, lon, direct) = match parts.as_slice() {
        [lat, lon] => (lat, lon, false),
        [lat, lon, flag] if flag.eq_ignore_ascii_case("direct") => (lat, lon, true),
        [_, _, flag] => bail!("unknown waypoint flag '{flag}' in '{arg}'"),
        _ => bail!("expected lat,lon[,direct], got '{arg}'"),
    };

    let lat: f64 = lat.parse().with_context(|| format!("invalid latitude in '{arg}'"))?;
    let lon: f64 = lon.parse().with_context(|| format!("invalid longitude in '{arg}'"))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("coordinates out of range in '{arg}'");
    }

    let waypoint = Waypoint::new(lat, lon);
    Ok(if direct { waypoint.direct() } else { waypoint })
}
