//! Mock repository implementations for testing
//!
//! Provides in-memory mocks for the core ports, enabling deterministic
//! service tests without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featuregate_core::ports::{FeatureRepository, UsageEventRepository, UserDirectory};
use featuregate_domain::{
    Feature, FeatureGateError, FeaturePatch, FeatureUsageEvent, Result as DomainResult,
};

/// In-memory mock for `FeatureRepository`.
///
/// Counts reads so cache behavior can be asserted, and can be switched into
/// a failing mode to exercise the service's error boundary.
#[derive(Default, Clone)]
pub struct MockFeatureRepository {
    features: Arc<Mutex<HashMap<String, Feature>>>,
    read_calls: Arc<AtomicUsize>,
    update_calls: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MockFeatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the mock with a feature.
    pub fn with_feature(self, feature: Feature) -> Self {
        self.features.lock().unwrap().insert(feature.id.clone(), feature);
        self
    }

    /// Make every operation return a database error.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of `find_active` calls that reached the store.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of `update` calls that reached the store.
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Direct (uncached) view of a stored feature for assertions.
    pub fn stored(&self, id: &str) -> Option<Feature> {
        self.features.lock().unwrap().get(id).cloned()
    }

    fn check_failing(&self) -> DomainResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(FeatureGateError::Database("mock store failure".to_string()))
        } else {
            Ok(())
        }
    }
}

fn apply_patch(feature: &mut Feature, patch: &FeaturePatch, now: DateTime<Utc>) {
    if let Some(name) = &patch.name {
        feature.name = name.clone();
    }
    if let Some(description) = &patch.description {
        feature.description = description.clone();
    }
    if let Some(state) = patch.state {
        feature.state = state;
    }
    if let Some(strategy) = patch.rollout_strategy {
        feature.rollout_strategy = strategy;
    }
    if let Some(config) = &patch.config {
        feature.config = config.clone();
    }
    if let Some(is_active) = patch.is_active {
        feature.is_active = is_active;
    }
    if let Some(percentage) = patch.rollout_percentage {
        feature.rollout_percentage = percentage;
    }
    if let Some(target) = patch.rollout_target_date {
        feature.rollout_target_date = target;
    }
    if let Some(groups) = &patch.ab_test_groups {
        feature.ab_test_groups = groups.clone();
    }
    if let Some(active) = patch.ab_test_active {
        feature.ab_test_active = active;
    }
    if let Some(roles) = &patch.target_user_roles {
        feature.target_user_roles = roles.clone();
    }
    if let Some(ids) = &patch.target_user_ids {
        feature.target_user_ids = ids.clone();
    }
    if let Some(ids) = &patch.excluded_user_ids {
        feature.excluded_user_ids = ids.clone();
    }
    feature.updated_at = now;
}

#[async_trait]
impl FeatureRepository for MockFeatureRepository {
    async fn insert(&self, feature: &Feature) -> DomainResult<()> {
        self.check_failing()?;
        let mut features = self.features.lock().unwrap();
        if features.contains_key(&feature.id) {
            return Err(FeatureGateError::Database(format!(
                "unique constraint violated: {}",
                feature.id
            )));
        }
        features.insert(feature.id.clone(), feature.clone());
        Ok(())
    }

    async fn update(&self, id: &str, patch: &FeaturePatch) -> DomainResult<bool> {
        self.check_failing()?;
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut features = self.features.lock().unwrap();
        match features.get_mut(id) {
            Some(feature) => {
                apply_patch(feature, patch, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_active(&self, id: &str) -> DomainResult<Option<Feature>> {
        self.check_failing()?;
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        let features = self.features.lock().unwrap();
        Ok(features.get(id).filter(|feature| feature.is_active).cloned())
    }

    async fn list_active(&self) -> DomainResult<Vec<Feature>> {
        self.check_failing()?;
        let features = self.features.lock().unwrap();
        let mut active: Vec<Feature> =
            features.values().filter(|feature| feature.is_active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        self.check_failing()?;
        let mut features = self.features.lock().unwrap();
        match features.get_mut(id) {
            Some(feature) => {
                feature.usage_count += 1;
                feature.last_used = Some(at);
                Ok(())
            }
            None => Err(FeatureGateError::NotFound(id.to_string())),
        }
    }
}

/// In-memory mock for `UsageEventRepository`.
#[derive(Default, Clone)]
pub struct MockUsageEventRepository {
    events: Arc<Mutex<Vec<FeatureUsageEvent>>>,
    fail: Arc<AtomicBool>,
}

impl MockUsageEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// All recorded events, in append order.
    pub fn recorded(&self) -> Vec<FeatureUsageEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageEventRepository for MockUsageEventRepository {
    async fn append(&self, event: &FeatureUsageEvent) -> DomainResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FeatureGateError::Database("mock store failure".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn find_since(
        &self,
        feature_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Vec<FeatureUsageEvent>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FeatureGateError::Database("mock store failure".to_string()));
        }
        let events = self.events.lock().unwrap();
        let mut matching: Vec<FeatureUsageEvent> = events
            .iter()
            .filter(|event| event.feature_id == feature_id && event.created_at >= cutoff)
            .cloned()
            .collect();
        matching.sort_by_key(|event| event.created_at);
        Ok(matching)
    }
}

/// In-memory mock for `UserDirectory`.
#[derive(Default, Clone)]
pub struct MockUserDirectory {
    users: Arc<Mutex<HashMap<i64, i64>>>,
    fail: Arc<AtomicBool>,
}

impl MockUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a telegram id -> user id mapping.
    pub fn with_user(self, telegram_id: i64, user_id: i64) -> Self {
        self.users.lock().unwrap().insert(telegram_id, user_id);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserDirectory for MockUserDirectory {
    async fn find_user_id(&self, telegram_id: i64) -> DomainResult<Option<i64>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FeatureGateError::Database("mock lookup failure".to_string()));
        }
        Ok(self.users.lock().unwrap().get(&telegram_id).copied())
    }
}
