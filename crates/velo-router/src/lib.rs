//! Velo Router - routing backend client
//!
//! Talks to a BRouter-compatible HTTP backend: compiles cost profiles,
//! requests paths between two points and snaps single positions.

pub mod client;
pub mod config;
pub mod error;
pub mod profile;
pub mod response;
pub mod retry;
pub mod service;

pub use client::HttpRouter;
pub use config::RouterConfig;
pub use error::RoutingError;
pub use profile::{profile_source, ProfileCache};
pub use retry::{RetryNotice, RetryPolicy};
pub use service::{ProfileId, RouteRequest, RoutingService};
