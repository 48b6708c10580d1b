//! Route sections: the edges between consecutive waypoints.

use tokio_util::sync::CancellationToken;
use velo_core::{LatLon, SectionId, WaypointId};

/// Never mutated; topology changes replace the section with a new id.
#[derive(Debug, Clone)]
pub struct Section {
    pub id: SectionId,
    pub start: WaypointId,
    pub end: WaypointId,
    pub from: LatLon,
    pub to: LatLon,
    /// Straight-line distance between the endpoints.
    pub distance_m: f64,
    pub direct: bool,
    cancel: CancellationToken,
}

impl Section {
    pub(crate) fn new(
        id: SectionId,
        (start, from): (WaypointId, LatLon),
        (end, to): (WaypointId, LatLon),
        direct: bool,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            id,
            start,
            end,
            from,
            to,
            distance_m: from.distance_to(&to),
            direct,
            cancel: parent.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}
