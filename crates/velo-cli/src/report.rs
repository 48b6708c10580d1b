//! Plain-text route output.

use std::io::{self, Write};

use velo_core::{PointCollection, RouteStats};

pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.2} km", meters / 1000.0)
    } else {
        format!("{meters:.0} m")
    }
}

pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, total / 60 % 60, total % 60)
}

pub fn print_stats(out: &mut impl Write, stats: &RouteStats) -> io::Result<()> {
    writeln!(out, "Distance:  {}", format_distance(stats.distance_m))?;
    writeln!(out, "Time:      {}", format_duration(stats.time_s))?;
    writeln!(out, "Ascent:    {:.0} m", stats.ascent_m)?;
    writeln!(out, "Descent:   {:.0} m", stats.descent_m)?;
    if let (Some(min), Some(max)) = (stats.min_altitude_m, stats.max_altitude_m) {
        writeln!(out, "Altitude:  {min:.0} .. {max:.0} m")?;
    }
    writeln!(
        out,
        "Sections:  {} ({} linked, {} without route)",
        stats.segment_count, stats.linked_segments, stats.invalid_segments
    )?;
    writeln!(out, "Points:    {}", stats.point_count)
}

/// One `distance altitude` line per profile sample, `step_m` apart.
pub fn print_profile(out: &mut impl Write, points: &PointCollection, step_m: f64) -> io::Result<()> {
    let total = points.total().distance_m;
    for (distance, altitude) in points.enumerate(0.0, total, step_m) {
        writeln!(out, "{distance:10.1} {altitude:8.1}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_distances_and_durations() {
        assert_eq!(format_distance(512.4), "512 m");
        assert_eq!(format_distance(12_345.0), "12.35 km");
        assert_eq!(format_duration(3725.0), "1:02:05");
        assert_eq!(format_duration(-3.0), "0:00:00");
    }

    #[test]
    fn stats_report_mentions_invalid_sections() {
        let stats = RouteStats {
            distance_m: 1500.0,
            segment_count: 2,
            linked_segments: 2,
            invalid_segments: 1,
            ..Default::default()
        };
        let mut out = Vec::new();
        print_stats(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1.50 km"));
        assert!(text.contains("2 (2 linked, 1 without route)"));
        assert!(!text.contains("Altitude"));
    }
}
