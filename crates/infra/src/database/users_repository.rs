//! SQLite-backed user directory.
//!
//! Resolves telegram ids to internal user ids for usage-event attribution.

use std::sync::Arc;

use async_trait::async_trait;
use featuregate_core::ports::UserDirectory;
use featuregate_domain::Result as DomainResult;
use rusqlite::params;
use tokio::task;

use super::manager::{map_join_error, map_sql_error, DbManager};

/// SQLite-backed implementation of `UserDirectory`.
pub struct SqliteUserDirectory {
    db: Arc<DbManager>,
}

impl SqliteUserDirectory {
    /// Create a new directory with the given database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn find_user_id(&self, telegram_id: i64) -> DomainResult<Option<i64>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> DomainResult<Option<i64>> {
            let conn = db.get_connection()?;
            match conn.query_row(
                "SELECT id FROM users WHERE telegram_id = ?1",
                params![telegram_id],
                |row| row.get::<_, i64>(0),
            ) {
                Ok(id) => Ok(Some(id)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(err) => Err(map_sql_error(err)),
            }
        })
        .await
        .map_err(map_join_error)?
    }
}

// ============================================================================
// Tests
// ============================================================================
