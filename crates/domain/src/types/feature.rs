//! Feature flag definition types.
//!
//! A [`Feature`] is a named capability gate. Its [`FeatureState`] decides
//! which evaluation path runs; the [`RolloutStrategy`] is only consulted when
//! the state is `Enabled`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ROLLOUT_PERCENTAGE;
use crate::errors::FeatureGateError;

/// Lifecycle state of a feature flag.
///
/// Stored as a string; values read back that do not parse fail closed to
/// [`FeatureState::Disabled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    /// Feature is on; the rollout strategy decides per user.
    Enabled,
    /// Feature is off for everyone.
    #[default]
    Disabled,
    /// Users are split into A/B test groups.
    AbTest,
    /// Effective percentage ramps up toward a target date.
    GradualRollout,
    /// Explicit include/exclude lists and role membership.
    UserSegment,
}

impl FeatureState {
    /// Canonical string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::AbTest => "ab_test",
            Self::GradualRollout => "gradual_rollout",
            Self::UserSegment => "user_segment",
        }
    }
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureState {
    type Err = FeatureGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            "ab_test" => Ok(Self::AbTest),
            "gradual_rollout" => Ok(Self::GradualRollout),
            "user_segment" => Ok(Self::UserSegment),
            other => {
                Err(FeatureGateError::InvalidInput(format!("unknown feature state: {other}")))
            }
        }
    }
}

/// Rule set determining which users see an `Enabled` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    /// Every user.
    #[default]
    AllUsers,
    /// Deterministic percentage bucketing.
    Percentage,
    /// Explicit user-id allow list.
    UserList,
    /// Role membership.
    RoleBased,
    /// Reserved; evaluates to deny.
    Geographic,
    /// Enabled once a target date is reached.
    TimeBased,
}

impl RolloutStrategy {
    /// Canonical string form used in storage.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AllUsers => "all_users",
            Self::Percentage => "percentage",
            Self::UserList => "user_list",
            Self::RoleBased => "role_based",
            Self::Geographic => "geographic",
            Self::TimeBased => "time_based",
        }
    }
}

impl fmt::Display for RolloutStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RolloutStrategy {
    type Err = FeatureGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all_users" => Ok(Self::AllUsers),
            "percentage" => Ok(Self::Percentage),
            "user_list" => Ok(Self::UserList),
            "role_based" => Ok(Self::RoleBased),
            "geographic" => Ok(Self::Geographic),
            "time_based" => Ok(Self::TimeBased),
            other => {
                Err(FeatureGateError::InvalidInput(format!("unknown rollout strategy: {other}")))
            }
        }
    }
}

/// One A/B test group.
///
/// Groups are kept in a `Vec` (not a map) so the configured order survives
/// storage round-trips; bucket assignment walks them in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbTestGroup {
    pub name: String,
    /// Share of the 0..100 bucket space claimed by this group.
    pub percentage: f64,
    /// Decision returned for users landing in this group.
    pub enabled: bool,
}

impl AbTestGroup {
    pub fn new(name: impl Into<String>, percentage: f64, enabled: bool) -> Self {
        Self { name: name.into(), percentage, enabled }
    }
}

/// Feature flag definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// Unique flag identifier (e.g. "beta_pod_features"), caller-chosen.
    pub id: String,
    pub name: String,
    pub description: String,
    /// Governs which decision path runs.
    pub state: FeatureState,
    /// Consulted only when `state` is `Enabled`.
    pub rollout_strategy: RolloutStrategy,
    /// Opaque key-value map reserved for future use.
    pub config: HashMap<String, serde_json::Value>,
    /// False means soft-deleted; the row is never physically removed.
    pub is_active: bool,
    /// 0-100. Used by `Percentage` and as the gradual-rollout ceiling.
    pub rollout_percentage: f64,
    /// Gradual rollout target; effective percentage reaches 100 here.
    pub rollout_target_date: Option<DateTime<Utc>>,
    /// A/B groups in configured order.
    pub ab_test_groups: Vec<AbTestGroup>,
    pub ab_test_active: bool,
    /// Roles granted access under `RoleBased` / `UserSegment`.
    pub target_user_roles: Vec<String>,
    /// User ids (decimal strings) granted access under `UserList` / `UserSegment`.
    pub target_user_ids: Vec<String>,
    /// User ids (decimal strings) always denied under `UserSegment`.
    pub excluded_user_ids: Vec<String>,
    /// Mutated only by the usage-logging path.
    pub usage_count: i64,
    /// Persisted as written; the authoritative rate is recomputed from the
    /// event log by the analytics aggregation.
    pub success_rate: f64,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Feature {
    /// Create a feature with default rollout (enabled for all users would
    /// still require `state = Enabled`; new features start disabled).
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            state: FeatureState::Disabled,
            rollout_strategy: RolloutStrategy::AllUsers,
            config: HashMap::new(),
            is_active: true,
            rollout_percentage: DEFAULT_ROLLOUT_PERCENTAGE,
            rollout_target_date: None,
            ab_test_groups: Vec::new(),
            ab_test_active: false,
            target_user_roles: Vec::new(),
            target_user_ids: Vec::new(),
            excluded_user_ids: Vec::new(),
            usage_count: 0,
            success_rate: 0.0,
            last_used: None,
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    /// Set the flag state.
    pub fn with_state(mut self, state: FeatureState) -> Self {
        self.state = state;
        self
    }

    /// Set the rollout strategy.
    pub fn with_strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.rollout_strategy = strategy;
        self
    }

    /// Set the rollout percentage.
    pub fn with_rollout_percentage(mut self, percentage: f64) -> Self {
        self.rollout_percentage = percentage;
        self
    }

    /// Record who created the flag.
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// Partial-field patch for [`Feature`].
///
/// `None` fields are left unchanged. Analytics fields (`usage_count`,
/// `last_used`) are deliberately absent; only the usage-logging path touches
/// them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub state: Option<FeatureState>,
    pub rollout_strategy: Option<RolloutStrategy>,
    pub config: Option<HashMap<String, serde_json::Value>>,
    pub is_active: Option<bool>,
    pub rollout_percentage: Option<f64>,
    pub rollout_target_date: Option<Option<DateTime<Utc>>>,
    pub ab_test_groups: Option<Vec<AbTestGroup>>,
    pub ab_test_active: Option<bool>,
    pub target_user_roles: Option<Vec<String>>,
    pub target_user_ids: Option<Vec<String>>,
    pub excluded_user_ids: Option<Vec<String>>,
}
