//! In-memory routing backend for engine tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use velo_core::{CostProfile, LatLon, RawSample};
use velo_engine::{EngineConfig, RouteBuilder, RouteEvent};
use velo_router::{ProfileId, RetryNotice, RouteRequest, RoutingError, RoutingService};

/// Answers every request with a straight five-sample path after `latency`.
///
/// The uphill cost of the compiled profile bends the middle samples sideways
/// so different profiles produce different paths.
#[derive(Default)]
pub struct ScriptedRouter {
    latency: Duration,
    route_calls: AtomicUsize,
    locate_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    retry_next: AtomicBool,
    unroutable: Mutex<Vec<LatLon>>,
}

impl ScriptedRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    /// Routes ending at `to` fail permanently.
    pub fn fail_routes_to(&self, to: LatLon) {
        self.unroutable.lock().unwrap().push(to);
    }

    /// The next route request reports one retry before succeeding.
    pub fn retry_next(&self) {
        self.retry_next.store(true, Ordering::SeqCst);
    }

    pub fn route_calls(&self) -> usize {
        self.route_calls.load(Ordering::SeqCst)
    }

    pub fn locate_calls(&self) -> usize {
        self.locate_calls.load(Ordering::SeqCst)
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }
}

pub fn straight_samples(from: LatLon, to: LatLon, bend_deg: f64) -> Vec<RawSample> {
    (0..5)
        .map(|i| {
            let t = i as f64 / 4.0;
            let bend = if i == 0 || i == 4 { 0.0 } else { bend_deg };
            RawSample::new(
                from.lat + (to.lat - from.lat) * t + bend,
                from.lon + (to.lon - from.lon) * t,
                100.0 + i as f64,
                i as f64 * 60.0,
            )
        })
        .collect()
}

impl RoutingService for ScriptedRouter {
    async fn route(
        &self,
        request: &RouteRequest,
        on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> Result<Vec<RawSample>, RoutingError> {
        self.route_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        if self.retry_next.swap(false, Ordering::SeqCst) {
            on_retry(RetryNotice {
                attempt: 1,
                max_retries: 3,
                delay: Duration::from_secs(1),
                reason: "router returned 503: busy".into(),
            });
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        if self.unroutable.lock().unwrap().contains(&request.to) {
            return Err(RoutingError::Rejected("target island detected".into()));
        }

        let uphill_cost: f64 = request
            .profile
            .0
            .strip_prefix("cost-")
            .and_then(|s| s.parse().ok())
            .unwrap_or(80.0);
        let bend = (uphill_cost - 80.0) * 1e-5;
        Ok(straight_samples(request.from, request.to, bend))
    }

    async fn locate(
        &self,
        point: LatLon,
        _on_retry: &(dyn Fn(RetryNotice) + Send + Sync),
    ) -> Result<RawSample, RoutingError> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        Ok(RawSample::new(point.lat, point.lon, 250.0, 0.0))
    }

    async fn compile_profile(&self, profile: &CostProfile) -> Result<ProfileId, RoutingError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProfileId(format!("cost-{}", profile.uphill_cost)))
    }
}

pub fn builder(router: &Arc<ScriptedRouter>) -> RouteBuilder<ScriptedRouter> {
    RouteBuilder::new(Arc::clone(router), EngineConfig::default())
}

pub fn record(builder: &mut RouteBuilder<ScriptedRouter>) -> Arc<Mutex<Vec<RouteEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    builder.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    events
}

pub fn count(events: &Mutex<Vec<RouteEvent>>, matches: impl Fn(&RouteEvent) -> bool) -> usize {
    events.lock().unwrap().iter().filter(|e| matches(e)).count()
}
