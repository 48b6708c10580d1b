//! Cost profile compilation and the by-value profile cache.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use velo_core::CostProfile;

use crate::error::RoutingError;
use crate::service::ProfileId;

/// Render a cost profile in the backend's profile language.
pub fn profile_source(profile: &CostProfile) -> String {
    format!(
        "---context:global\n\
         assign validForBikes = true\n\
         assign uphillcost = {uphill_cost}\n\
         assign uphillcutoff = {uphill_cutoff}\n\
         assign downhillcost = {downhill_cost}\n\
         assign downhillcutoff = {downhill_cutoff}\n\
         assign turncost = {turn_cost}\n\
         \n\
         ---context:way\n\
         assign costfactor = switch highway=motorway|motorway_link|trunk 10000 \
         switch highway=cycleway 1 switch highway=primary 2 1.2\n\
         \n\
         ---context:node\n\
         assign initialcost = 0\n",
        uphill_cost = profile.uphill_cost,
        uphill_cutoff = tenths(profile.uphill_cutoff),
        downhill_cost = profile.downhill_cost,
        downhill_cutoff = tenths(profile.downhill_cutoff),
        turn_cost = profile.turn_cost,
    )
}

fn tenths(value: u32) -> String {
    format!("{}.{}", value / 10, value % 10)
}

/// Compiled profile ids keyed by profile value.
///
/// Concurrent requests for the same profile share one upload; a failed
/// upload leaves the slot empty so the next caller tries again.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: DashMap<CostProfile, Arc<OnceCell<ProfileId>>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, profile: &CostProfile) -> Option<ProfileId> {
        self.entries
            .get(profile)
            .and_then(|cell| cell.value().get().cloned())
    }

    pub async fn get_or_compile<F, Fut>(
        &self,
        profile: &CostProfile,
        compile: F,
    ) -> Result<ProfileId, RoutingError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProfileId, RoutingError>>,
    {
        // Clone the cell out so no map shard lock is held across the await.
        let cell = Arc::clone(self.entries.entry(*profile).or_default().value());
        cell.get_or_try_init(compile).await.cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn source_carries_all_five_parameters() {
        let source = profile_source(&CostProfile {
            uphill_cost: 70,
            uphill_cutoff: 35,
            downhill_cost: 50,
            downhill_cutoff: 5,
            turn_cost: 0,
        });
        assert!(source.contains("assign uphillcost = 70\n"));
        assert!(source.contains("assign uphillcutoff = 3.5\n"));
        assert!(source.contains("assign downhillcost = 50\n"));
        assert!(source.contains("assign downhillcutoff = 0.5\n"));
        assert!(source.contains("assign turncost = 0\n"));
    }

    #[tokio::test]
    async fn equal_profiles_compile_once() {
        let cache = ProfileCache::new();
        let uploads = AtomicUsize::new(0);
        let compile = || async {
            uploads.fetch_add(1, Ordering::SeqCst);
            Ok(ProfileId("custom_1".into()))
        };

        let profile = CostProfile::default();
        let a = cache.get_or_compile(&profile, compile).await.unwrap();
        let b = cache.get_or_compile(&profile, compile).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&profile), Some(a));
    }

    #[tokio::test]
    async fn failed_compile_is_not_cached() {
        let cache = ProfileCache::new();
        let profile = CostProfile::default();
        let failed = cache
            .get_or_compile(&profile, || async { Err(RoutingError::EmptyPath) })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let id = cache
            .get_or_compile(&profile, || async { Ok(ProfileId("custom_2".into())) })
            .await
            .unwrap();
        assert_eq!(id.0, "custom_2");
    }
}
