//! Ports for flag persistence, usage events, and user lookup.
//!
//! Infrastructure implements these traits; the service layer only ever sees
//! the trait objects. Enum and JSON-typed fields are serialized to strings by
//! the implementation before storage and parsed back on read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featuregate_domain::{Feature, FeaturePatch, FeatureUsageEvent, Result};

/// Port for persisting feature flag definitions.
#[async_trait]
pub trait FeatureRepository: Send + Sync {
    /// Insert a new feature. Id collisions surface as errors from the
    /// store's uniqueness constraint; no pre-check is performed here.
    async fn insert(&self, feature: &Feature) -> Result<()>;

    /// Apply a partial patch to the feature with the given id, stamping
    /// `updated_at`. Returns `false` when no row matched.
    async fn update(&self, id: &str, patch: &FeaturePatch) -> Result<bool>;

    /// Fetch the active (non-soft-deleted) feature with the given id.
    async fn find_active(&self, id: &str) -> Result<Option<Feature>>;

    /// All active features.
    async fn list_active(&self) -> Result<Vec<Feature>>;

    /// Bump the usage counter and stamp `last_used`.
    ///
    /// Must be issued as a store-level atomic increment
    /// (`usage_count = usage_count + 1`); a read-modify-write from the
    /// application layer would lose updates under concurrent access.
    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// Port for the append-only usage event log.
#[async_trait]
pub trait UsageEventRepository: Send + Sync {
    /// Append one event. Events are never mutated or deleted here.
    async fn append(&self, event: &FeatureUsageEvent) -> Result<()>;

    /// Events for a feature at or after the cutoff, ascending by time so
    /// first-seen tie-breaks downstream are deterministic.
    async fn find_since(
        &self,
        feature_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<FeatureUsageEvent>>;
}

/// Port for resolving telegram ids to internal user ids.
///
/// Used best-effort by usage logging: a failed lookup downgrades to a null
/// user id on the event, it does not fail the log operation.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user_id(&self, telegram_id: i64) -> Result<Option<i64>>;
}
