//! Serializable route state for external persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use velo_core::{CostProfile, NoGoArea, RouteData, RouteResult, Waypoint};

/// Stored outcome of one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SectionSnapshot {
    /// No result yet; calculated again on restore.
    Pending,
    Invalid,
    Valid { data: RouteData },
}

impl SectionSnapshot {
    pub(crate) fn from_result(result: Option<&RouteResult>) -> Self {
        match result {
            None => SectionSnapshot::Pending,
            Some(RouteResult::Invalid) => SectionSnapshot::Invalid,
            Some(RouteResult::Valid(data)) => SectionSnapshot::Valid {
                data: data.as_ref().clone(),
            },
        }
    }

    /// `None` for a pending section.
    pub(crate) fn into_result(self) -> Option<RouteResult> {
        match self {
            SectionSnapshot::Pending => None,
            SectionSnapshot::Invalid => Some(RouteResult::Invalid),
            SectionSnapshot::Valid { data } => Some(RouteResult::from_data(data)),
        }
    }
}

/// Waypoints in order plus one entry per section between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub profile: CostProfile,
    #[serde(default)]
    pub no_go: Vec<NoGoArea>,
    pub waypoints: Vec<Waypoint>,
    pub sections: Vec<SectionSnapshot>,
}

impl RouteSnapshot {
    /// Sections must sit between consecutive waypoints.
    pub fn is_consistent(&self) -> bool {
        self.sections.len() == self.waypoints.len().saturating_sub(1)
    }
}
