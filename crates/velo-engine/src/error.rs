use thiserror::Error;
use velo_core::{CompareError, WaypointId};

#[derive(Debug, Error, PartialEq)]
pub enum RouteError {
    #[error("unknown waypoint {0}")]
    UnknownWaypoint(WaypointId),
    #[error("position {index} out of range for {len} waypoints")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no-go area {index} out of range for {len} areas")]
    UnknownNoGoArea { index: usize, len: usize },
    #[error("no comparison in progress")]
    NoComparison,
    #[error(transparent)]
    Compare(#[from] CompareError),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}
