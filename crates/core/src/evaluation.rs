//! Pure enablement decisions.
//!
//! [`evaluate`] turns a [`Feature`] definition plus caller context into a
//! [`Decision`]. It is read-only: recording usage is the caller's job, via
//! the service's logging path.
//!
//! Dispatch is a pair of exhaustive matches: the flag state picks the
//! decision path, and for `Enabled` features the rollout strategy picks the
//! rule. Every arm that has nothing to say denies.

use chrono::{DateTime, Utc};
use featuregate_domain::{Feature, FeatureState, RolloutStrategy};
use serde::{Deserialize, Serialize};

use crate::bucketing::user_bucket;

/// Outcome of one enablement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub enabled: bool,
    /// A/B group the user was assigned to, when the feature is an A/B test.
    pub ab_group: Option<String>,
}

impl Decision {
    /// Denied, with no group assignment.
    pub fn deny() -> Self {
        Self { enabled: false, ab_group: None }
    }

    /// Allowed, with no group assignment.
    pub fn allow() -> Self {
        Self { enabled: true, ab_group: None }
    }

    fn from_bool(enabled: bool) -> Self {
        Self { enabled, ab_group: None }
    }
}

/// Evaluate whether `user_id` sees `feature` at time `now`.
pub fn evaluate(
    feature: &Feature,
    user_id: i64,
    user_roles: &[String],
    now: DateTime<Utc>,
) -> Decision {
    if !feature.is_active {
        return Decision::deny();
    }

    match feature.state {
        FeatureState::Disabled => Decision::deny(),
        FeatureState::Enabled => evaluate_strategy(feature, user_id, user_roles, now),
        FeatureState::AbTest => assign_ab_group(feature, user_id),
        FeatureState::GradualRollout => evaluate_gradual_rollout(feature, user_id, now),
        FeatureState::UserSegment => evaluate_segment(feature, user_id, user_roles),
    }
}

fn evaluate_strategy(
    feature: &Feature,
    user_id: i64,
    user_roles: &[String],
    now: DateTime<Utc>,
) -> Decision {
    match feature.rollout_strategy {
        RolloutStrategy::AllUsers => Decision::allow(),
        RolloutStrategy::Percentage => {
            Decision::from_bool(f64::from(user_bucket(user_id)) < feature.rollout_percentage)
        }
        RolloutStrategy::UserList => {
            Decision::from_bool(feature.target_user_ids.contains(&user_id.to_string()))
        }
        RolloutStrategy::RoleBased => Decision::from_bool(
            !user_roles.is_empty()
                && user_roles.iter().any(|role| feature.target_user_roles.contains(role)),
        ),
        RolloutStrategy::TimeBased => match feature.rollout_target_date {
            Some(target) => Decision::from_bool(now >= target),
            None => Decision::allow(),
        },
        // Reserved strategy with no handler yet.
        RolloutStrategy::Geographic => Decision::deny(),
    }
}

/// Assign the user to an A/B group by walking the groups in configured order
/// and accumulating their percentage shares.
///
/// Group percentages are not validated to sum to 100: over-subscription means
/// later groups are unreachable, under-subscription leaves high buckets
/// unassigned (denied, no group).
fn assign_ab_group(feature: &Feature, user_id: i64) -> Decision {
    if !feature.ab_test_active || feature.ab_test_groups.is_empty() {
        return Decision::deny();
    }

    let bucket = f64::from(user_bucket(user_id));
    let mut cumulative = 0.0;
    for group in &feature.ab_test_groups {
        cumulative += group.percentage;
        if bucket < cumulative {
            return Decision { enabled: group.enabled, ab_group: Some(group.name.clone()) };
        }
    }

    Decision::deny()
}

fn evaluate_gradual_rollout(feature: &Feature, user_id: i64, now: DateTime<Utc>) -> Decision {
    Decision::from_bool(f64::from(user_bucket(user_id)) < effective_percentage(feature, now))
}

/// Effective percentage of a gradual rollout at `now`.
///
/// Without a target date the rollout is static. With one, the percentage
/// ramps linearly from creation time to the target, reaching exactly 100 at
/// (and after) the target. A target at or before creation time degenerates
/// to the static percentage.
pub fn effective_percentage(feature: &Feature, now: DateTime<Utc>) -> f64 {
    let Some(target) = feature.rollout_target_date else {
        return feature.rollout_percentage;
    };

    if now >= target {
        return 100.0;
    }

    let start = feature.created_at;
    let total_secs = (target - start).num_seconds();
    if total_secs <= 0 {
        return feature.rollout_percentage;
    }

    let elapsed_secs = (now - start).num_seconds();
    let progress = (elapsed_secs as f64 / total_secs as f64).clamp(0.0, 1.0);
    progress * feature.rollout_percentage
}

/// Segment targeting: exclusion always wins, then explicit inclusion, then
/// role membership, then default deny.
fn evaluate_segment(feature: &Feature, user_id: i64, user_roles: &[String]) -> Decision {
    let user_key = user_id.to_string();

    if feature.excluded_user_ids.contains(&user_key) {
        return Decision::deny();
    }

    if !feature.target_user_ids.is_empty() && feature.target_user_ids.contains(&user_key) {
        return Decision::allow();
    }

    if !feature.target_user_roles.is_empty()
        && user_roles.iter().any(|role| feature.target_user_roles.contains(role))
    {
        return Decision::allow();
    }

    Decision::deny()
}
