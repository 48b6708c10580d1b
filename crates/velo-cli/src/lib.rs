//! Velo CLI - command line helpers for the velo-plan binary.

pub mod report;
pub mod waypoint;

pub use report::{format_distance, format_duration, print_profile, print_stats};
pub use waypoint::parse_waypoint;
