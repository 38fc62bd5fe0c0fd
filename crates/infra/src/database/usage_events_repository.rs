//! SQLite-backed usage event log.
//!
//! Append-only: events are inserted once and never mutated or deleted here.
//! Windowed reads come back ascending by timestamp so downstream first-seen
//! tie-breaks are deterministic.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use featuregate_core::ports::UsageEventRepository;
use featuregate_domain::{
    FeatureUsageEvent, Result as DomainResult, UsageEventType,
};
use rusqlite::{params, Row};
use tokio::task;
use tracing::warn;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-backed usage event repository.
pub struct SqliteUsageEventRepository {
    db: Arc<DbManager>,
}

impl SqliteUsageEventRepository {
    /// Create a new repository with the given database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UsageEventRepository for SqliteUsageEventRepository {
    async fn append(&self, event: &FeatureUsageEvent) -> DomainResult<()> {
        let db = Arc::clone(&self.db);
        let event = event.clone();

        task::spawn_blocking(move || -> DomainResult<()> {
            let conn = db.get_connection()?;
            let metadata = serde_json::to_string(&event.metadata).map_err(|e| {
                featuregate_domain::FeatureGateError::Serialization(e.to_string())
            })?;
            conn.execute(
                "INSERT INTO feature_usage_events (
                    feature_id, user_id, user_telegram_id, event_type, metadata,
                    ab_test_group, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.feature_id,
                    event.user_id,
                    event.user_telegram_id,
                    event.event_type.as_str(),
                    metadata,
                    event.ab_test_group,
                    event.created_at.timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn find_since(
        &self,
        feature_id: &str,
        cutoff: DateTime<Utc>,
    ) -> DomainResult<Vec<FeatureUsageEvent>> {
        let db = Arc::clone(&self.db);
        let feature_id = feature_id.to_string();

        task::spawn_blocking(move || -> DomainResult<Vec<FeatureUsageEvent>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT feature_id, user_id, user_telegram_id, event_type, metadata,
                            ab_test_group, created_at
                     FROM feature_usage_events
                     WHERE feature_id = ?1 AND created_at >= ?2
                     ORDER BY created_at ASC, id ASC",
                )
                .map_err(map_sql_error)?;
            let events = stmt
                .query_map(params![feature_id, cutoff.timestamp()], map_event_row)
                .map_err(map_sql_error)?
                .collect::<Result<Vec<FeatureUsageEvent>, rusqlite::Error>>()
                .map_err(map_sql_error)?;
            Ok(events)
        })
        .await
        .map_err(map_join_error)?
    }
}

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<FeatureUsageEvent> {
    let event_type_text: String = row.get(3)?;
    // Unknown event types degrade to Access rather than failing the read;
    // the aggregation only special-cases the types it knows.
    let event_type = UsageEventType::from_str(&event_type_text).unwrap_or_else(|_| {
        warn!(event_type = %event_type_text, "unknown usage event type, treating as access");
        UsageEventType::Access
    });

    let metadata_text: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_text).unwrap_or_default();

    Ok(FeatureUsageEvent {
        feature_id: row.get(0)?,
        user_id: row.get(1)?,
        user_telegram_id: row.get(2)?,
        event_type,
        metadata,
        ab_test_group: row.get(5)?,
        created_at: DateTime::from_timestamp(row.get(6)?, 0).unwrap_or(DateTime::UNIX_EPOCH),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (SqliteUsageEventRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("events.db");

        let mgr = Arc::new(DbManager::new(&db_path, 4).expect("db manager created"));
        mgr.run_migrations().expect("migrations run");

        let repo = SqliteUsageEventRepository::new(mgr.clone());
        (repo, mgr, temp_dir)
    }

    fn event(feature_id: &str, telegram_id: i64, days_ago: i64) -> FeatureUsageEvent {
        FeatureUsageEvent {
            feature_id: feature_id.to_string(),
            user_id: Some(telegram_id),
            user_telegram_id: telegram_id,
            event_type: UsageEventType::Access,
            metadata: HashMap::new(),
            ab_test_group: None,
            created_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn append_and_read_back_round_trips() {
        let (repo, _mgr, _dir) = setup().await;

        let mut ev = event("beta_pods", 555, 0);
        ev.event_type = UsageEventType::Error;
        ev.metadata.insert("error_type".to_string(), json!("timeout"));
        ev.ab_test_group = Some("treatment".to_string());
        repo.append(&ev).await.expect("append succeeded");

        let cutoff = Utc::now() - Duration::days(1);
        let events = repo.find_since("beta_pods", cutoff).await.expect("query succeeded");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, UsageEventType::Error);
        assert_eq!(events[0].metadata.get("error_type"), Some(&json!("timeout")));
        assert_eq!(events[0].ab_test_group.as_deref(), Some("treatment"));
        assert_eq!(events[0].user_id, Some(555));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn find_since_respects_the_window_and_feature() {
        let (repo, _mgr, _dir) = setup().await;

        repo.append(&event("beta_pods", 1, 0)).await.expect("append succeeded");
        repo.append(&event("beta_pods", 2, 10)).await.expect("append succeeded");
        repo.append(&event("other", 3, 0)).await.expect("append succeeded");

        let cutoff = Utc::now() - Duration::days(7);
        let events = repo.find_since("beta_pods", cutoff).await.expect("query succeeded");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user_telegram_id, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn events_come_back_in_chronological_order() {
        let (repo, _mgr, _dir) = setup().await;

        repo.append(&event("beta_pods", 3, 1)).await.expect("append succeeded");
        repo.append(&event("beta_pods", 1, 5)).await.expect("append succeeded");
        repo.append(&event("beta_pods", 2, 3)).await.expect("append succeeded");

        let cutoff = Utc::now() - Duration::days(30);
        let events = repo.find_since("beta_pods", cutoff).await.expect("query succeeded");
        let order: Vec<i64> = events.iter().map(|e| e.user_telegram_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }
}
