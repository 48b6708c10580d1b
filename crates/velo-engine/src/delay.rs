//! Delay gate for coalescing interactive edits into one burst.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelayMode {
    /// Calculations start right away.
    #[default]
    None,
    /// Only sections longer than the configured threshold wait.
    LongSections,
    /// Every new calculation waits.
    Always,
}

impl DelayMode {
    pub fn applies_to(self, distance_m: f64, long_section_m: f64) -> bool {
        match self {
            DelayMode::None => false,
            DelayMode::LongSections => distance_m > long_section_m,
            DelayMode::Always => true,
        }
    }
}

/// Shared awaitable: all waiting calculations resume together when the mode
/// stops applying to them.
#[derive(Debug, Clone)]
pub struct DelayGate {
    mode: Arc<watch::Sender<DelayMode>>,
}

impl Default for DelayGate {
    fn default() -> Self {
        Self::new(DelayMode::None)
    }
}

impl DelayGate {
    pub fn new(mode: DelayMode) -> Self {
        let (tx, _) = watch::channel(mode);
        Self { mode: Arc::new(tx) }
    }

    pub fn mode(&self) -> DelayMode {
        *self.mode.borrow()
    }

    pub fn set(&self, mode: DelayMode) -> DelayMode {
        self.mode.send_replace(mode)
    }

    /// Resolve once the current mode no longer holds back a section of
    /// `distance_m`.
    pub async fn wait_open(&self, distance_m: f64, long_section_m: f64) {
        let mut rx = self.mode.subscribe();
        let _ = rx
            .wait_for(|mode| !mode.applies_to(distance_m, long_section_m))
            .await;
    }
}
