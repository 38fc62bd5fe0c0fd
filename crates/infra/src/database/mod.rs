//! Database implementations

pub mod features_repository;
pub mod manager;
pub mod usage_events_repository;
pub mod users_repository;

pub use features_repository::SqliteFeatureRepository;
pub use manager::DbManager;
pub use usage_events_repository::SqliteUsageEventRepository;
pub use users_repository::SqliteUserDirectory;
