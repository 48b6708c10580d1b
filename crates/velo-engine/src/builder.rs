//! Route builder: waypoint list, section graph and the calculation pump.
//!
//! All edit operations are synchronous and must run inside a tokio runtime;
//! they spawn one calculation task per new section. Finished calculations
//! come back over a channel and are applied by [`RouteBuilder::process_messages`]
//! (or [`RouteBuilder::wait_settled`]), so segments are only ever mutated by
//! the owner of the builder.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use velo_core::{
    CompareSession, CostProfile, LatLon, NoGoArea, PointCollection, Poi, PoiId, PoiTracker,
    RouteStats, SectionId, TrackIndex, Waypoint, WaypointId,
};
use velo_router::RoutingService;

use crate::calculation::{spawn_calculation, CalcContext, CalcMessage, CalculationJob};
use crate::change_lock::ChangeLock;
use crate::config::EngineConfig;
use crate::delay::{DelayGate, DelayMode};
use crate::error::RouteError;
use crate::events::{EventBus, RouteEvent, SubscriptionId};
use crate::section::Section;
use crate::snapshot::{RouteSnapshot, SectionSnapshot};

struct PendingCompare {
    session: CompareSession,
    profile: CostProfile,
}

pub struct RouteBuilder<S: RoutingService> {
    config: EngineConfig,
    ctx: CalcContext<S>,
    rx: UnboundedReceiver<CalcMessage>,
    lock: ChangeLock,
    waypoints: HashMap<WaypointId, Waypoint>,
    order: Vec<WaypointId>,
    /// Keyed by start waypoint.
    sections: HashMap<WaypointId, Section>,
    points: PointCollection,
    pois: PoiTracker,
    no_go: Vec<NoGoArea>,
    profile: CostProfile,
    recalc: CancellationToken,
    events: EventBus,
    compare: Option<PendingCompare>,
    next_waypoint: u64,
    next_section: u64,
    initial_load: bool,
}

impl<S: RoutingService> RouteBuilder<S> {
    pub fn new(service: Arc<S>, config: EngineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let settled_tx = tx.clone();
        let lock = ChangeLock::with_settled(move || {
            let _ = settled_tx.send(CalcMessage::Settled);
        });
        let ctx = CalcContext {
            service,
            delay: DelayGate::default(),
            long_section_m: config.long_section_m,
            direct_speed_mps: config.direct_speed_mps(),
            tx,
        };
        Self {
            config,
            ctx,
            rx,
            lock,
            waypoints: HashMap::new(),
            order: Vec::new(),
            sections: HashMap::new(),
            points: PointCollection::new(),
            pois: PoiTracker::new(),
            no_go: Vec::new(),
            profile: CostProfile::default(),
            recalc: CancellationToken::new(),
            events: EventBus::new(),
            compare: None,
            next_waypoint: 0,
            next_section: 0,
            initial_load: false,
        }
    }

    // ---- accessors ----

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn waypoint_ids(&self) -> &[WaypointId] {
        &self.order
    }

    pub fn waypoint(&self, id: WaypointId) -> Option<&Waypoint> {
        self.waypoints.get(&id)
    }

    pub fn waypoints(&self) -> impl Iterator<Item = (WaypointId, &Waypoint)> + '_ {
        self.order
            .iter()
            .filter_map(|id| self.waypoints.get(id).map(|wp| (*id, wp)))
    }

    /// Sections in route order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> + '_ {
        self.order.iter().filter_map(|id| self.sections.get(id))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn points(&self) -> &PointCollection {
        &self.points
    }

    pub fn stats(&self) -> RouteStats {
        self.points.stats()
    }

    pub fn profile(&self) -> CostProfile {
        self.profile
    }

    pub fn no_go_areas(&self) -> &[NoGoArea] {
        &self.no_go
    }

    pub fn delay_mode(&self) -> DelayMode {
        self.ctx.delay.mode()
    }

    /// The change lock; plain `enter` waits for all calculations to drain.
    pub fn lock(&self) -> &ChangeLock {
        &self.lock
    }

    pub fn subscribe(
        &mut self,
        handler: impl FnMut(&RouteEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    // ---- waypoint edits ----

    pub fn add_first(&mut self, waypoint: Waypoint) -> WaypointId {
        let id = self.alloc_waypoint(waypoint);
        self.order.insert(0, id);
        if self.order.len() > 1 {
            self.add_section(0, true);
        }
        self.debug_check();
        id
    }

    pub fn add_last(&mut self, waypoint: Waypoint) -> WaypointId {
        let id = self.alloc_waypoint(waypoint);
        self.order.push(id);
        if self.order.len() > 1 {
            self.add_section(self.order.len() - 2, true);
        }
        self.debug_check();
        id
    }

    /// Insert at `index` (0 ..= waypoint count), splitting the section there.
    pub fn insert_point(&mut self, index: usize, waypoint: Waypoint) -> Result<WaypointId, RouteError> {
        let len = self.order.len();
        if index > len {
            return Err(RouteError::IndexOutOfRange { index, len });
        }
        if index == 0 {
            return Ok(self.add_first(waypoint));
        }
        if index == len {
            return Ok(self.add_last(waypoint));
        }

        self.remove_section(index - 1);
        let id = self.alloc_waypoint(waypoint);
        self.order.insert(index, id);
        self.add_section(index - 1, true);
        self.add_section(index, true);
        self.debug_check();
        Ok(id)
    }

    pub fn remove_point(&mut self, id: WaypointId) -> Result<Waypoint, RouteError> {
        let pos = self.position(id)?;
        let has_prev = pos > 0;
        let has_next = pos + 1 < self.order.len();

        if has_next {
            self.remove_section(pos);
        }
        if has_prev {
            self.remove_section(pos - 1);
        }
        self.order.remove(pos);
        let waypoint = self
            .waypoints
            .remove(&id)
            .unwrap_or_else(|| panic!("{id} is ordered but missing from the arena"));
        if has_prev && has_next {
            self.add_section(pos - 1, true);
        }
        self.debug_check();
        Ok(waypoint)
    }

    /// Move a waypoint in place; its handle stays valid.
    pub fn move_point(&mut self, id: WaypointId, location: LatLon) -> Result<(), RouteError> {
        let pos = self.position(id)?;
        self.waypoint_mut(id)?.location = location;
        self.rebuild_adjacent(pos);
        self.debug_check();
        Ok(())
    }

    /// Flip the straight-line flag of the section ending at `id`.
    pub fn set_is_direct_route(&mut self, id: WaypointId, direct: bool) -> Result<(), RouteError> {
        let pos = self.position(id)?;
        let waypoint = self.waypoint_mut(id)?;
        if waypoint.is_direct_route == direct {
            return Ok(());
        }
        waypoint.is_direct_route = direct;
        if pos > 0 {
            self.rebuild_section(pos - 1);
        }
        self.debug_check();
        Ok(())
    }

    pub fn set_file_split(&mut self, id: WaypointId, is_file_split: bool) -> Result<(), RouteError> {
        let pos = self.position(id)?;
        let waypoint = self.waypoint_mut(id)?;
        if waypoint.is_file_split == is_file_split {
            return Ok(());
        }
        waypoint.is_file_split = is_file_split;
        if pos + 1 < self.order.len() {
            self.points.segments_mut().set_starts_file(pos, is_file_split);
        }
        self.events.publish(&RouteEvent::FileSplitChanged {
            waypoint: id,
            is_file_split,
        });
        Ok(())
    }

    /// Remove every waypoint and section.
    pub fn clear(&mut self) {
        for index in (0..self.sections.len()).rev() {
            self.remove_section(index);
        }
        self.order.clear();
        self.waypoints.clear();
        self.debug_check();
    }

    // ---- calculation control ----

    pub fn set_delay_calculation(&mut self, mode: DelayMode) {
        let previous = self.ctx.delay.set(mode);
        if previous != mode {
            info!(?previous, ?mode, "Delay mode changed");
        }
    }

    /// Redo every section under `profile`. Cancelling `cancel` stops the whole
    /// recalculation; sections created by later edits get a fresh scope.
    ///
    /// Every section is replaced right away, so the previous points are gone
    /// and a cancelled run leaves the route unresolved. Call
    /// [`begin_compare`](Self::begin_compare) first to be able to restore them
    /// with [`rollback_compare`](Self::rollback_compare).
    pub fn recalculate_all(&mut self, profile: CostProfile, cancel: CancellationToken) {
        info!(sections = self.sections.len(), "Recalculating all sections");
        self.profile = profile;
        self.recalc = cancel;
        for index in 0..self.sections.len() {
            self.rebuild_section(index);
        }
        self.debug_check();
    }

    /// Recalculate the sections whose points enter `area`; pending ones restart.
    pub fn add_no_go_area(&mut self, area: NoGoArea) {
        self.no_go.push(area);
        let affected: Vec<usize> = self
            .sections()
            .enumerate()
            .filter(|(index, section)| {
                let Some(segment) = self.points.segments().get(*index) else {
                    return false;
                };
                if !segment.is_resolved() {
                    return true;
                }
                !section.direct && segment.points().iter().any(|p| area.contains(&p.location()))
            })
            .map(|(index, _)| index)
            .collect();
        info!(affected = affected.len(), "No-go area added");
        for index in affected {
            self.rebuild_section(index);
        }
        self.debug_check();
    }

    /// Recalculate the sections whose routing envelope touches the removed
    /// area; pending ones restart.
    pub fn remove_no_go_area(&mut self, index: usize) -> Result<NoGoArea, RouteError> {
        if index >= self.no_go.len() {
            return Err(RouteError::UnknownNoGoArea {
                index,
                len: self.no_go.len(),
            });
        }
        let area = self.no_go.remove(index);
        let affected: Vec<usize> = self
            .sections()
            .enumerate()
            .filter(|(i, section)| {
                let resolved = self
                    .points
                    .segments()
                    .get(*i)
                    .is_some_and(|s| s.is_resolved());
                !resolved || (!section.direct && envelope_touches(section, &area))
            })
            .map(|(i, _)| i)
            .collect();
        info!(affected = affected.len(), "No-go area removed");
        for i in affected {
            self.rebuild_section(i);
        }
        self.debug_check();
        Ok(area)
    }

    // ---- message pump ----

    /// Apply every completion queued so far. Returns how many were handled.
    pub fn process_messages(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            handled += 1;
        }
        handled
    }

    /// Wait for the next completion and apply it.
    pub async fn process_next(&mut self) {
        if let Some(message) = self.rx.recv().await {
            self.apply(message);
        }
    }

    /// Wait until no calculation is running, then apply what they produced.
    ///
    /// Calculations held back by the delay gate count as running.
    pub async fn wait_settled(&mut self) {
        let lock = self.lock.clone();
        let guard = lock.enter().await;
        self.process_messages();
        drop(guard);
    }

    fn apply(&mut self, message: CalcMessage) {
        match message {
            CalcMessage::Starting { section } => {
                if self.live_index(section).is_some() {
                    self.events
                        .publish(&RouteEvent::CalculationStarting { section });
                }
            }
            CalcMessage::Retrying { section, notice } => {
                if self.live_index(section).is_some() {
                    self.events.publish(&RouteEvent::CalculationRetrying {
                        section,
                        attempt: notice.attempt,
                        max_retries: notice.max_retries,
                        reason: notice.reason,
                    });
                }
            }
            CalcMessage::Finished { section, result } => {
                let Some(index) = self.live_index(section) else {
                    debug!(%section, "Discarding result of a replaced section");
                    return;
                };
                if !result.is_valid() {
                    warn!(%section, index, "Section has no valid route");
                }
                self.points.segments_mut().update_at(index, result.clone());
                self.pois.refresh_section(section, result.points());
                if let Some(pending) = self.compare.as_mut() {
                    pending.session.observe(index, &result);
                }
                debug!(%section, index, points = result.len(), "Section calculated");
                self.events.publish(&RouteEvent::CalculationFinished {
                    section,
                    index,
                    result,
                });
            }
            CalcMessage::Settled => {
                let initial_load = std::mem::take(&mut self.initial_load);
                info!(
                    distance_m = self.points.total().distance_m,
                    initial_load,
                    "Route settled"
                );
                self.events
                    .publish(&RouteEvent::RouteChanged { initial_load });
            }
        }
    }

    /// Segment index of `section` if it is still part of the route.
    fn live_index(&self, section: SectionId) -> Option<usize> {
        let index = self.points.segments().index_of(section)?;
        let start = self.order.get(index)?;
        self.sections
            .get(start)
            .is_some_and(|s| s.id == section && !s.is_cancelled())
            .then_some(index)
    }

    // ---- compare session ----

    /// Snapshot the current segments; later results are diffed against it.
    pub fn begin_compare(&mut self) {
        self.compare = Some(PendingCompare {
            session: CompareSession::begin(self.points.segments()),
            profile: self.profile,
        });
    }

    pub fn compare(&self) -> Option<&CompareSession> {
        self.compare.as_ref().map(|p| &p.session)
    }

    /// Keep the new route and end the comparison.
    pub fn finish_compare(&mut self) -> Option<CompareSession> {
        self.compare.take().map(|p| p.session)
    }

    /// Restore the segments and profile from before the comparison started.
    pub fn rollback_compare(&mut self) -> Result<usize, RouteError> {
        let pending = self.compare.take().ok_or(RouteError::NoComparison)?;
        let restored = pending.session.rollback(self.points.segments_mut())?;

        for section in self.sections.values() {
            section.cancel();
        }
        self.profile = pending.profile;
        let unresolved: Vec<usize> = self
            .points
            .segments()
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.is_resolved())
            .map(|(i, _)| i)
            .collect();
        for index in unresolved {
            self.rebuild_section(index);
        }
        for segment in self.points.segments().iter() {
            self.pois.refresh_section(segment.section(), segment.points());
        }

        info!(restored, "Comparison rolled back");
        self.events
            .publish(&RouteEvent::RouteChanged { initial_load: false });
        Ok(restored)
    }

    // ---- persistence ----

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            saved_at: Utc::now(),
            profile: self.profile,
            no_go: self.no_go.clone(),
            waypoints: self.waypoints().map(|(_, wp)| *wp).collect(),
            sections: self
                .points
                .segments()
                .iter()
                .map(|s| SectionSnapshot::from_result(s.result()))
                .collect(),
        }
    }

    /// Replace the route with `snapshot`. Stored sections are used as-is;
    /// pending ones are calculated. `RouteChanged { initial_load: true }`
    /// follows once nothing is left to calculate.
    pub fn restore(&mut self, snapshot: RouteSnapshot) -> Result<Vec<WaypointId>, RouteError> {
        if !snapshot.is_consistent() {
            return Err(RouteError::InvalidSnapshot(format!(
                "{} sections for {} waypoints",
                snapshot.sections.len(),
                snapshot.waypoints.len()
            )));
        }

        self.clear();
        self.compare = None;
        self.profile = snapshot.profile;
        self.no_go = snapshot.no_go;
        let ids: Vec<WaypointId> = snapshot
            .waypoints
            .into_iter()
            .map(|wp| self.alloc_waypoint(wp))
            .collect();
        self.order = ids.clone();

        let mut pending = 0;
        for (index, stored) in snapshot.sections.into_iter().enumerate() {
            match stored.into_result() {
                Some(result) => {
                    let section = self.add_section(index, false);
                    self.points.segments_mut().update_at(index, result);
                    if let Some(segment) = self.points.segments().get(index) {
                        self.pois.refresh_section(section, segment.points());
                    }
                }
                None => {
                    self.add_section(index, true);
                    pending += 1;
                }
            }
        }
        self.debug_check();

        info!(waypoints = ids.len(), pending, "Route restored");
        if pending == 0 {
            self.events
                .publish(&RouteEvent::RouteChanged { initial_load: true });
        } else {
            self.initial_load = true;
        }
        Ok(ids)
    }

    // ---- POIs ----

    pub fn add_poi(&mut self, poi: Poi) -> PoiId {
        self.pois.add(poi, self.points.segments())
    }

    pub fn remove_poi(&mut self, id: PoiId) -> Option<Poi> {
        self.pois.remove(id)
    }

    pub fn pois(&self) -> &PoiTracker {
        &self.pois
    }

    /// Where the POI's on-track marker sits, if it is on the track at all.
    pub fn poi_marker(&self, id: PoiId) -> Option<TrackIndex> {
        self.pois.marker(id, self.points.segments())
    }

    // ---- internals ----

    fn position(&self, id: WaypointId) -> Result<usize, RouteError> {
        self.order
            .iter()
            .position(|w| *w == id)
            .ok_or(RouteError::UnknownWaypoint(id))
    }

    fn waypoint_mut(&mut self, id: WaypointId) -> Result<&mut Waypoint, RouteError> {
        self.waypoints
            .get_mut(&id)
            .ok_or(RouteError::UnknownWaypoint(id))
    }

    fn alloc_waypoint(&mut self, waypoint: Waypoint) -> WaypointId {
        let id = WaypointId(self.next_waypoint);
        self.next_waypoint += 1;
        self.waypoints.insert(id, waypoint);
        id
    }

    /// Create the section between `order[index]` and `order[index + 1]`.
    fn add_section(&mut self, index: usize, calculate: bool) -> SectionId {
        let start = self.order[index];
        let end = self.order[index + 1];
        let from = self.waypoints[&start];
        let to = self.waypoints[&end];

        if self.recalc.is_cancelled() {
            self.recalc = CancellationToken::new();
        }
        let id = SectionId(self.next_section);
        self.next_section += 1;
        let section = Section::new(
            id,
            (start, from.location),
            (end, to.location),
            to.is_direct_route,
            &self.recalc,
        );

        let segments = self.points.segments_mut();
        segments.insert(index, id);
        segments.set_starts_file(index, from.is_file_split);
        debug!(
            section = %id,
            index,
            distance_m = section.distance_m,
            direct = section.direct,
            "Section added"
        );

        if calculate {
            self.start_calculation(&section);
        }
        self.sections.insert(start, section);
        self.events
            .publish(&RouteEvent::SectionAdded { section: id, index });
        id
    }

    fn start_calculation(&self, section: &Section) {
        let job = CalculationJob {
            section: section.id,
            from: section.from,
            to: section.to,
            distance_m: section.distance_m,
            direct: section.direct,
            no_go: self.no_go.clone(),
            profile: self.profile,
            token: section.token(),
        };
        spawn_calculation(&self.ctx, job, self.lock.enter_calculation());
    }

    /// Cancel and drop the section starting at `order[index]`.
    fn remove_section(&mut self, index: usize) -> Section {
        let start = self.order[index];
        let section = self
            .sections
            .remove(&start)
            .unwrap_or_else(|| panic!("no section starts at {start}"));
        section.cancel();
        self.points.segments_mut().remove(section.id);
        self.pois.drop_section(section.id);
        debug!(section = %section.id, index, "Section removed");
        self.events.publish(&RouteEvent::SectionRemoved {
            section: section.id,
            index,
        });
        section
    }

    fn rebuild_section(&mut self, index: usize) {
        self.remove_section(index);
        self.add_section(index, true);
    }

    /// Replace both sections touching the waypoint at `pos`.
    fn rebuild_adjacent(&mut self, pos: usize) {
        let has_prev = pos > 0;
        let has_next = pos + 1 < self.order.len();
        if has_next {
            self.remove_section(pos);
        }
        if has_prev {
            self.rebuild_section(pos - 1);
        }
        if has_next {
            self.add_section(pos, true);
        }
    }

    #[cfg(debug_assertions)]
    fn debug_check(&self) {
        self.check_invariants();
    }

    #[cfg(not(debug_assertions))]
    fn debug_check(&self) {}

    /// Assert that sections and segments mirror the waypoint order.
    pub fn check_invariants(&self) {
        assert_eq!(
            self.sections.len(),
            self.order.len().saturating_sub(1),
            "section count does not match waypoint count"
        );
        let segments = self.points.segments();
        assert_eq!(segments.len(), self.sections.len(), "segment count mismatch");
        for (i, pair) in self.order.windows(2).enumerate() {
            let section = &self.sections[&pair[0]];
            assert_eq!(section.start, pair[0], "section {i} start");
            assert_eq!(section.end, pair[1], "section {i} end");
            assert_eq!(
                segments.get(i).map(|s| s.section()),
                Some(section.id),
                "segment {i} does not mirror its section"
            );
        }
        self.points.check_invariants();
    }
}

/// Routed paths are assumed to stay within this factor of the straight line.
const DETOUR_FACTOR: f64 = 1.5;

/// Whether the area reaches into the ellipse around the section endpoints
/// that a routed path could have used.
fn envelope_touches(section: &Section, area: &NoGoArea) -> bool {
    let via = area.center.distance_to(&section.from) + area.center.distance_to(&section.to);
    via - 2.0 * area.radius_m <= section.distance_m * DETOUR_FACTOR
}
