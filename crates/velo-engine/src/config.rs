//! Engine configuration from environment.

use std::env;

use velo_router::RouterConfig;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub router: RouterConfig,
    /// Sections longer than this wait under `DelayMode::LongSections`.
    pub long_section_m: f64,
    /// Assumed riding speed for straight-line sections.
    pub direct_speed_kmh: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            long_section_m: 25_000.0,
            direct_speed_kmh: 15.0,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            router: RouterConfig::from_env(),
            long_section_m: env::var("VELO_LONG_SECTION_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.long_section_m),
            direct_speed_kmh: env::var("VELO_DIRECT_SPEED_KMH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|v: &f64| *v > 0.0)
                .unwrap_or(defaults.direct_speed_kmh),
        }
    }

    pub fn direct_speed_mps(&self) -> f64 {
        self.direct_speed_kmh / 3.6
    }
}
