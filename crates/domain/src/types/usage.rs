//! Usage event and analytics report types.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::FeatureGateError;

/// Kind of usage event recorded against a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventType {
    /// The feature was accessed; increments the feature's usage counter.
    Access,
    Success,
    Error,
    Conversion,
    /// Emitted once per emergency disable, attributed to the system user.
    EmergencyDisable,
}

impl UsageEventType {
    /// Canonical string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Success => "success",
            Self::Error => "error",
            Self::Conversion => "conversion",
            Self::EmergencyDisable => "emergency_disable",
        }
    }
}

impl fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageEventType {
    type Err = FeatureGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Self::Access),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "conversion" => Ok(Self::Conversion),
            "emergency_disable" => Ok(Self::EmergencyDisable),
            other => Err(FeatureGateError::InvalidInput(format!("unknown event type: {other}"))),
        }
    }
}

/// Append-only record of one feature usage event.
///
/// Never mutated or deleted by this component; retention is an external
/// concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureUsageEvent {
    pub feature_id: String,
    /// Resolved internal user id; `None` when the lookup failed.
    pub user_id: Option<i64>,
    pub user_telegram_id: i64,
    pub event_type: UsageEventType,
    pub metadata: HashMap<String, serde_json::Value>,
    pub ab_test_group: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-A/B-group slice of an analytics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group: String,
    pub events: u64,
    pub unique_users: u64,
    pub success_rate: f64,
}

/// One ranked error type from the error breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub error_type: String,
    pub count: u64,
}

/// Aggregated usage report for one feature over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageAnalytics {
    pub feature_id: String,
    pub window_days: i64,
    pub total_events: u64,
    /// Distinct telegram user ids seen in the window.
    pub unique_users: u64,
    pub access_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// success / access, 0 when there were no access events.
    pub success_rate: f64,
    /// error / access, 0 when there were no access events.
    pub error_rate: f64,
    /// Event counts bucketed by day (`YYYY-MM-DD`).
    pub daily_usage: BTreeMap<String, u64>,
    /// Present only when at least one event carried an A/B group.
    pub group_stats: Vec<GroupStats>,
    /// Top error types by count, ties broken by first appearance.
    pub top_errors: Vec<ErrorCount>,
}

impl UsageAnalytics {
    /// Report with all counters at zero, used when no events exist (or the
    /// store read failed and the boundary degrades to an empty report).
    pub fn empty(feature_id: impl Into<String>, window_days: i64) -> Self {
        Self {
            feature_id: feature_id.into(),
            window_days,
            total_events: 0,
            unique_users: 0,
            access_count: 0,
            success_count: 0,
            error_count: 0,
            success_rate: 0.0,
            error_rate: 0.0,
            daily_usage: BTreeMap::new(),
            group_stats: Vec::new(),
            top_errors: Vec::new(),
        }
    }
}
