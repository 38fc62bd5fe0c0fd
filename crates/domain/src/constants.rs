//! Application constants
//!
//! Centralized location for all domain-level constants used throughout the
//! feature control system.

use std::time::Duration;

// Flag cache configuration
pub const FLAG_CACHE_TTL: Duration = Duration::from_secs(300);

// Rollout configuration
pub const DEFAULT_ROLLOUT_PERCENTAGE: f64 = 100.0;
pub const BUCKET_COUNT: u64 = 100;

// Usage logging
/// Sentinel telegram id used for events the system emits on its own behalf
/// (e.g. emergency disables).
pub const SYSTEM_USER_TELEGRAM_ID: i64 = 0;
pub const TOP_ERROR_LIMIT: usize = 5;
pub const UNKNOWN_ERROR_TYPE: &str = "unknown";
