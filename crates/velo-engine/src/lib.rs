//! Velo Engine - route graph under concurrent recalculation
//!
//! Owns the waypoint list and the sections between them, runs one routing
//! task per section and folds the results into the point collection.

mod calculation;
pub mod builder;
pub mod change_lock;
pub mod config;
pub mod delay;
pub mod error;
pub mod events;
pub mod section;
pub mod snapshot;

pub use builder::RouteBuilder;
pub use change_lock::{CalculationEntry, CalculationGuard, ChangeGuard, ChangeLock};
pub use config::EngineConfig;
pub use delay::{DelayGate, DelayMode};
pub use error::RouteError;
pub use events::{EventBus, RouteEvent, SubscriptionId};
pub use section::Section;
pub use snapshot::{RouteSnapshot, SectionSnapshot};
