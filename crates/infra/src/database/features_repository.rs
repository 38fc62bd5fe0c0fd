//! SQLite-backed feature repository.
//!
//! Implements the `FeatureRepository` port. All database operations run in
//! `spawn_blocking` to avoid blocking the async runtime. Enum fields are
//! stored in their canonical string form; JSON-typed fields (config, A/B
//! groups, targeting lists) are serialized to TEXT columns.
//!
//! Rows whose stored enum text no longer parses fail closed: the feature
//! materializes as `Disabled` rather than erroring the read path.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featuregate_core::ports::FeatureRepository;
use featuregate_domain::{
    Feature, FeatureGateError, FeaturePatch, FeatureState, Result as DomainResult,
    RolloutStrategy,
};
use rusqlite::{params, params_from_iter, Row, ToSql};
use tokio::task;
use tracing::warn;

use super::manager::{map_join_error, map_sql_error, DbConnection, DbManager};

const FEATURE_COLUMNS: &str = "id, name, description, state, rollout_strategy, config,
        is_active, rollout_percentage, rollout_target_date, ab_test_groups, ab_test_active,
        target_user_roles, target_user_ids, excluded_user_ids, usage_count, success_rate,
        last_used, created_at, updated_at, created_by";

/// SQLite-backed feature repository.
pub struct SqliteFeatureRepository {
    db: Arc<DbManager>,
}

impl SqliteFeatureRepository {
    /// Create a new repository with the given database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeatureRepository for SqliteFeatureRepository {
    async fn insert(&self, feature: &Feature) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let feature = feature.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            insert_feature(&conn, &feature)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update(&self, id: &str, patch: &FeaturePatch) -> DomainResult<bool> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        let patch = patch.clone();

        task::spawn_blocking(move || -> DomainResult<bool> {
            let conn = db.get_connection()?;
            update_feature(&conn, &id, &patch, Utc::now())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_active(&self, id: &str) -> DomainResult<Option<Feature>> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<Option<Feature>> {
            let conn = db.get_connection()?;
            let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE id = ?1 AND is_active = 1");
            match conn.query_row(&sql, params![id], map_feature_row) {
                Ok(feature) => Ok(Some(feature)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn list_active(&self) -> DomainResult<Vec<Feature>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Vec<Feature>> {
            let conn = db.get_connection()?;
            let sql = format!("SELECT {FEATURE_COLUMNS} FROM features WHERE is_active = 1 ORDER BY id");
            let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
            let features = stmt
                .query_map(params![], map_feature_row)
                .map_err(map_sql_error)?
                .collect::<Result<Vec<Feature>, rusqlite::Error>>()
                .map_err(map_sql_error)?;
            Ok(features)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            // Atomic increment at the store level; a read-modify-write here
            // would lose updates under concurrent access.
            let affected = conn
                .execute(
                    "UPDATE features SET usage_count = usage_count + 1, last_used = ?1
                     WHERE id = ?2",
                    params![at.timestamp(), id],
                )
                .map_err(map_sql_error)?;
            if affected == 0 {
                return Err(FeatureGateError::NotFound(id));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// Synchronous SQL Operations (called inside spawn_blocking)
// ============================================================================

fn insert_feature(conn: &DbConnection, feature: &Feature) -> DomainResult<()> {
    conn.execute(
        "INSERT INTO features (
            id, name, description, state, rollout_strategy, config,
            is_active, rollout_percentage, rollout_target_date, ab_test_groups, ab_test_active,
            target_user_roles, target_user_ids, excluded_user_ids, usage_count, success_rate,
            last_used, created_at, updated_at, created_by
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            feature.id,
            feature.name,
            feature.description,
            feature.state.as_str(),
            feature.rollout_strategy.as_str(),
            to_json(&feature.config)?,
            i64::from(feature.is_active),
            feature.rollout_percentage,
            feature.rollout_target_date.map(|t| t.timestamp()),
            to_json(&feature.ab_test_groups)?,
            i64::from(feature.ab_test_active),
            to_json(&feature.target_user_roles)?,
            to_json(&feature.target_user_ids)?,
            to_json(&feature.excluded_user_ids)?,
            feature.usage_count,
            feature.success_rate,
            feature.last_used.map(|t| t.timestamp()),
            feature.created_at.timestamp(),
            feature.updated_at.timestamp(),
            feature.created_by,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

/// Apply a partial patch, always stamping `updated_at`.
/// Returns false when no row matched the id.
fn update_feature(
    conn: &DbConnection,
    id: &str,
    patch: &FeaturePatch,
    now: DateTime<Utc>,
) -> DomainResult<bool> {
    let mut sets: Vec<&str> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(name) = &patch.name {
        sets.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(description) = &patch.description {
        sets.push("description = ?");
        values.push(Box::new(description.clone()));
    }
    if let Some(state) = patch.state {
        sets.push("state = ?");
        values.push(Box::new(state.as_str()));
    }
    if let Some(strategy) = patch.rollout_strategy {
        sets.push("rollout_strategy = ?");
        values.push(Box::new(strategy.as_str()));
    }
    if let Some(config) = &patch.config {
        sets.push("config = ?");
        values.push(Box::new(to_json(config)?));
    }
    if let Some(is_active) = patch.is_active {
        sets.push("is_active = ?");
        values.push(Box::new(i64::from(is_active)));
    }
    if let Some(percentage) = patch.rollout_percentage {
        sets.push("rollout_percentage = ?");
        values.push(Box::new(percentage));
    }
    if let Some(target) = patch.rollout_target_date {
        sets.push("rollout_target_date = ?");
        values.push(Box::new(target.map(|t| t.timestamp())));
    }
    if let Some(groups) = &patch.ab_test_groups {
        sets.push("ab_test_groups = ?");
        values.push(Box::new(to_json(groups)?));
    }
    if let Some(active) = patch.ab_test_active {
        sets.push("ab_test_active = ?");
        values.push(Box::new(i64::from(active)));
    }
    if let Some(roles) = &patch.target_user_roles {
        sets.push("target_user_roles = ?");
        values.push(Box::new(to_json(roles)?));
    }
    if let Some(ids) = &patch.target_user_ids {
        sets.push("target_user_ids = ?");
        values.push(Box::new(to_json(ids)?));
    }
    if let Some(ids) = &patch.excluded_user_ids {
        sets.push("excluded_user_ids = ?");
        values.push(Box::new(to_json(ids)?));
    }

    sets.push("updated_at = ?");
    values.push(Box::new(now.timestamp()));
    values.push(Box::new(id.to_string()));

    let sql = format!("UPDATE features SET {} WHERE id = ?", sets.join(", "));
    let affected = conn
        .execute(&sql, params_from_iter(values.iter().map(|value| value.as_ref())))
        .map_err(map_sql_error)?;
    Ok(affected > 0)
}

fn map_feature_row(row: &Row<'_>) -> rusqlite::Result<Feature> {
    let id: String = row.get(0)?;
    let state_text: String = row.get(3)?;
    let strategy_text: String = row.get(4)?;

    // Fail closed on stored enum text this build no longer understands.
    let (state, rollout_strategy) = match (
        FeatureState::from_str(&state_text),
        RolloutStrategy::from_str(&strategy_text),
    ) {
        (Ok(state), Ok(strategy)) => (state, strategy),
        _ => {
            warn!(
                feature_id = %id,
                state = %state_text,
                strategy = %strategy_text,
                "unparseable flag fields, treating feature as disabled"
            );
            (FeatureState::Disabled, RolloutStrategy::AllUsers)
        }
    };

    Ok(Feature {
        id,
        name: row.get(1)?,
        description: row.get(2)?,
        state,
        rollout_strategy,
        config: from_json(&row.get::<_, String>(5)?, "config"),
        is_active: row.get::<_, i64>(6)? != 0,
        rollout_percentage: row.get(7)?,
        rollout_target_date: row.get::<_, Option<i64>>(8)?.and_then(epoch_to_datetime),
        ab_test_groups: from_json(&row.get::<_, String>(9)?, "ab_test_groups"),
        ab_test_active: row.get::<_, i64>(10)? != 0,
        target_user_roles: from_json(&row.get::<_, String>(11)?, "target_user_roles"),
        target_user_ids: from_json(&row.get::<_, String>(12)?, "target_user_ids"),
        excluded_user_ids: from_json(&row.get::<_, String>(13)?, "excluded_user_ids"),
        usage_count: row.get(14)?,
        success_rate: row.get(15)?,
        last_used: row.get::<_, Option<i64>>(16)?.and_then(epoch_to_datetime),
        created_at: epoch_to_datetime(row.get(17)?).unwrap_or(DateTime::UNIX_EPOCH),
        updated_at: epoch_to_datetime(row.get(18)?).unwrap_or(DateTime::UNIX_EPOCH),
        created_by: row.get(19)?,
    })
}

fn epoch_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn to_json<T: serde::Serialize>(value: &T) -> DomainResult<String> {
    serde_json::to_string(value).map_err(|e| FeatureGateError::Serialization(e.to_string()))
}

/// Deserialize a JSON column, falling back to the type's default on
/// malformed content (fail closed rather than erroring the read path).
fn from_json<T: serde::de::DeserializeOwned + Default>(text: &str, column: &str) -> T {
    match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            warn!(column, error = %err, "malformed json column, using default");
            T::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
