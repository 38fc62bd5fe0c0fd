//! # FeatureGate Core
//!
//! Business logic for the feature control system.
//!
//! This crate contains:
//! - Ports (traits) for flag persistence, usage events, and user lookup
//! - The pure enablement decision engine (flag/strategy dispatch, bucketing,
//!   gradual rollout, segment targeting)
//! - Usage analytics aggregation
//! - The TTL flag cache and the orchestrating [`FeatureGateService`]
//!
//! ## Architecture
//! - Depends only on `featuregate-domain`
//! - Infrastructure implements the ports defined here
//! - Decision evaluation is pure and side-effect free

pub mod analytics;
pub mod bucketing;
pub mod cache;
pub mod evaluation;
pub mod ports;
pub mod service;

// Re-export commonly used items
pub use cache::{Clock, FlagCache, MockClock, SystemClock};
pub use evaluation::{evaluate, Decision};
pub use ports::{FeatureRepository, UsageEventRepository, UserDirectory};
pub use service::FeatureGateService;
