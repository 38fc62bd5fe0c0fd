//! Feature gate service with in-memory caching.
//!
//! High-level interface to feature flags: CRUD over definitions, per-user
//! enablement decisions, usage logging, and analytics. Persistence is
//! delegated to the port implementations.
//!
//! # Caching Strategy
//!
//! - **Read-through**: `get` checks the cache first, queries the store on
//!   miss, populates the cache
//! - **Write-through invalidation**: every successful create/update/delete
//!   drops the whole cache (never individual keys)
//! - **Bounded staleness**: concurrent readers may see a value up to one TTL
//!   stale; no invalidation is ever lost
//! - **Lazy loading**: the cache is populated on demand, never preloaded
//!
//! # Error boundary
//!
//! No public method returns an error. Store failures are logged and degrade
//! to `false`, `None`, or an empty collection, so callers check the value
//! rather than catching. Internal helpers still propagate `Result` with `?`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use featuregate_domain::constants::{FLAG_CACHE_TTL, SYSTEM_USER_TELEGRAM_ID};
use featuregate_domain::{
    AbTestGroup, Feature, FeaturePatch, FeatureState, FeatureUsageEvent, Result as DomainResult,
    RolloutStrategy, UsageAnalytics, UsageEventType,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::analytics::aggregate;
use crate::cache::{Clock, FlagCache, SystemClock};
use crate::evaluation::{evaluate, Decision};
use crate::ports::{FeatureRepository, UsageEventRepository, UserDirectory};

/// Feature gate service.
///
/// Owns the flag cache and orchestrates the repository ports. Cheap to share
/// behind an `Arc`; the decision path takes no locks beyond the cache read.
pub struct FeatureGateService<C = SystemClock>
where
    C: Clock + Clone,
{
    features: Arc<dyn FeatureRepository>,
    events: Arc<dyn UsageEventRepository>,
    users: Arc<dyn UserDirectory>,
    cache: FlagCache<C>,
    clock: C,
}

impl FeatureGateService<SystemClock> {
    /// Create a service with the default cache TTL and system clock.
    pub fn new(
        features: Arc<dyn FeatureRepository>,
        events: Arc<dyn UsageEventRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self::with_clock(features, events, users, FLAG_CACHE_TTL, SystemClock)
    }
}

impl<C> FeatureGateService<C>
where
    C: Clock + Clone,
{
    /// Create a service with a custom TTL and clock (useful for testing).
    pub fn with_clock(
        features: Arc<dyn FeatureRepository>,
        events: Arc<dyn UsageEventRepository>,
        users: Arc<dyn UserDirectory>,
        cache_ttl: Duration,
        clock: C,
    ) -> Self {
        Self {
            features,
            events,
            users,
            cache: FlagCache::with_clock(cache_ttl, clock.clone()),
            clock,
        }
    }

    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.clock.system_time())
    }

    /// Create a new feature definition.
    ///
    /// Id collisions are left to the store's uniqueness constraint and come
    /// back as `false`.
    pub async fn create(&self, feature: Feature) -> bool {
        match self.features.insert(&feature).await {
            Ok(()) => {
                self.cache.invalidate_all();
                info!(feature_id = %feature.id, state = %feature.state, "feature created");
                true
            }
            Err(err) => {
                error!(feature_id = %feature.id, error = %err, "failed to create feature");
                false
            }
        }
    }

    /// Patch an existing feature.
    ///
    /// Returns `false` when the store reports no row affected; the cache is
    /// only invalidated on an effective write.
    pub async fn update(&self, feature_id: &str, patch: FeaturePatch) -> bool {
        match self.features.update(feature_id, &patch).await {
            Ok(true) => {
                self.cache.invalidate_all();
                info!(feature_id = %feature_id, "feature updated");
                true
            }
            Ok(false) => {
                warn!(feature_id = %feature_id, "update matched no feature");
                false
            }
            Err(err) => {
                error!(feature_id = %feature_id, error = %err, "failed to update feature");
                false
            }
        }
    }

    /// Soft-delete a feature. The row stays behind for audit; reads and
    /// decisions no longer see it.
    pub async fn delete(&self, feature_id: &str) -> bool {
        self.update(feature_id, FeaturePatch { is_active: Some(false), ..Default::default() })
            .await
    }

    /// Fetch one active feature, cache-first.
    ///
    /// Negative lookups are not cached; a repeated miss always reaches the
    /// store.
    pub async fn get(&self, feature_id: &str) -> Option<Feature> {
        if let Some(hit) = self.cache.get(feature_id) {
            return Some(hit);
        }

        match self.features.find_active(feature_id).await {
            Ok(Some(feature)) => {
                self.cache.store(feature.clone());
                Some(feature)
            }
            Ok(None) => None,
            Err(err) => {
                error!(feature_id = %feature_id, error = %err, "failed to read feature");
                None
            }
        }
    }

    /// All active features, always fresh (bypasses the cache).
    pub async fn list_all(&self) -> Vec<Feature> {
        match self.features.list_active().await {
            Ok(features) => features,
            Err(err) => {
                error!(error = %err, "failed to list features");
                Vec::new()
            }
        }
    }

    /// Decide whether `user_id` sees the feature.
    ///
    /// Read-only; callers wanting usage accounting invoke [`Self::log_usage`]
    /// separately. A missing or inactive feature denies.
    pub async fn is_enabled(
        &self,
        feature_id: &str,
        user_id: i64,
        user_roles: &[String],
    ) -> Decision {
        match self.get(feature_id).await {
            Some(feature) => evaluate(&feature, user_id, user_roles, self.now()),
            None => Decision::deny(),
        }
    }

    /// Record one usage event.
    ///
    /// The telegram id is resolved to an internal user id best-effort; a
    /// failed lookup records the event with a null user id. `Access` events
    /// additionally bump the feature's usage counter via a store-level
    /// atomic increment.
    pub async fn log_usage(
        &self,
        feature_id: &str,
        user_telegram_id: i64,
        event_type: UsageEventType,
        metadata: HashMap<String, serde_json::Value>,
        ab_test_group: Option<String>,
    ) {
        let user_id = match self.users.find_user_id(user_telegram_id).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    telegram_id = user_telegram_id,
                    error = %err,
                    "user lookup failed, recording event without user id"
                );
                None
            }
        };

        let now = self.now();
        let event = FeatureUsageEvent {
            feature_id: feature_id.to_string(),
            user_id,
            user_telegram_id,
            event_type,
            metadata,
            ab_test_group,
            created_at: now,
        };

        if let Err(err) = self.events.append(&event).await {
            error!(feature_id = %feature_id, error = %err, "failed to record usage event");
            return;
        }

        if event_type == UsageEventType::Access {
            if let Err(err) = self.features.record_access(feature_id, now).await {
                error!(feature_id = %feature_id, error = %err, "failed to bump usage counter");
            }
        }
    }

    /// Aggregate usage over the trailing `days_back` days.
    ///
    /// Store failures degrade to an empty report.
    pub async fn get_analytics(&self, feature_id: &str, days_back: i64) -> UsageAnalytics {
        match self.try_get_analytics(feature_id, days_back).await {
            Ok(report) => report,
            Err(err) => {
                error!(feature_id = %feature_id, error = %err, "failed to aggregate usage");
                UsageAnalytics::empty(feature_id, days_back)
            }
        }
    }

    async fn try_get_analytics(
        &self,
        feature_id: &str,
        days_back: i64,
    ) -> DomainResult<UsageAnalytics> {
        let cutoff = self.now() - chrono::Duration::days(days_back);
        let events = self.events.find_since(feature_id, cutoff).await?;
        Ok(aggregate(feature_id, days_back, &events))
    }

    // ========================================================================
    // Convenience Operations
    // ========================================================================

    /// Turn the feature fully on (every user).
    pub async fn enable(&self, feature_id: &str) -> bool {
        self.update(
            feature_id,
            FeaturePatch {
                state: Some(FeatureState::Enabled),
                rollout_strategy: Some(RolloutStrategy::AllUsers),
                ..Default::default()
            },
        )
        .await
    }

    /// Turn the feature off for everyone.
    pub async fn disable(&self, feature_id: &str) -> bool {
        self.update(
            feature_id,
            FeaturePatch { state: Some(FeatureState::Disabled), ..Default::default() },
        )
        .await
    }

    /// Switch the feature to a percentage rollout.
    pub async fn set_percentage_rollout(&self, feature_id: &str, percentage: f64) -> bool {
        if !(0.0..=100.0).contains(&percentage) {
            warn!(feature_id = %feature_id, percentage, "rollout percentage out of range");
            return false;
        }
        self.update(
            feature_id,
            FeaturePatch {
                state: Some(FeatureState::GradualRollout),
                rollout_strategy: Some(RolloutStrategy::Percentage),
                rollout_percentage: Some(percentage),
                ..Default::default()
            },
        )
        .await
    }

    /// Switch the feature to an active A/B test with the given groups.
    pub async fn create_ab_test(&self, feature_id: &str, groups: Vec<AbTestGroup>) -> bool {
        self.update(
            feature_id,
            FeaturePatch {
                state: Some(FeatureState::AbTest),
                ab_test_groups: Some(groups),
                ab_test_active: Some(true),
                ..Default::default()
            },
        )
        .await
    }

    /// Disable the feature immediately and record why.
    ///
    /// A failed disable short-circuits: no event is written.
    pub async fn emergency_disable(&self, feature_id: &str, reason: &str) -> bool {
        if !self.disable(feature_id).await {
            return false;
        }

        let metadata = HashMap::from([("reason".to_string(), json!(reason))]);
        self.log_usage(
            feature_id,
            SYSTEM_USER_TELEGRAM_ID,
            UsageEventType::EmergencyDisable,
            metadata,
            None,
        )
        .await;

        info!(feature_id = %feature_id, reason, "feature emergency disabled");
        true
    }
}
