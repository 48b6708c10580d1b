//! The routing backend boundary used by the route engine.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use velo_core::{CostProfile, LatLon, NoGoArea, RawSample};

use crate::error::RoutingError;
use crate::retry::RetryNotice;

/// Backend handle of a compiled cost profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub String);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    pub from: LatLon,
    pub to: LatLon,
    pub no_go: Vec<NoGoArea>,
    pub profile: ProfileId,
}

/// A point-to-point router.
///
/// Implementations retry transient failures themselves and call `on_retry`
/// before every backoff sleep.
pub trait RoutingService: Send + Sync + 'static {
    /// Ordered samples of the path between the request endpoints.
    fn route(
        &self,
        request: &RouteRequest,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> impl Future<Output = Result<Vec<RawSample>, RoutingError>> + Send;

    /// Snap one position onto the routable network.
    fn locate(
        &self,
        point: LatLon,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> impl Future<Output = Result<RawSample, RoutingError>> + Send;

    /// Compile `profile` on the backend. Equal profiles yield the cached id.
    fn compile_profile(
        &self,
        profile: &CostProfile,
    ) -> impl Future<Output = Result<ProfileId, RoutingError>> + Send;
}
