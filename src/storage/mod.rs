//! Storage implementations.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::{StorageConfig, StorageType};
use crate::interfaces::{ActionStore, EventStore, RecordingStore};

pub mod helpers;
pub mod mock;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod schema;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use mock::{MockActionStore, MockEventStore, MockRecordingStore};

#[cfg(feature = "sqlite")]
pub use sql::sqlite::{SqliteActionStore, SqliteEventStore, SqliteRecordingStore};

#[cfg(feature = "postgres")]
pub use sql::postgres::{PostgresActionStore, PostgresEventStore, PostgresRecordingStore};

/// The three stores the query services read from.
#[derive(Clone)]
pub struct Stores {
    pub events: Arc<dyn EventStore>,
    pub actions: Arc<dyn ActionStore>,
    pub recordings: Arc<dyn RecordingStore>,
}

impl Stores {
    /// Empty in-memory stores.
    pub fn mock() -> Self {
        Self {
            events: Arc::new(MockEventStore::new()),
            actions: Arc::new(MockActionStore::new()),
            recordings: Arc::new(MockRecordingStore::new()),
        }
    }
}

/// Initialize storage based on configuration.
///
/// Connects to the configured backend, creates the tables when missing and
/// returns all three stores sharing one pool.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores, Box<dyn std::error::Error>> {
    match config.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!("Storage: sqlite at {}", config.sqlite.path);

            let pool = if config.sqlite.path == ":memory:" {
                // Every connection to :memory: opens its own database.
                sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect(&config.sqlite.uri())
                    .await?
            } else {
                if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                sqlx::SqlitePool::connect(&config.sqlite.uri()).await?
            };
            sql::sqlite::init_schema(&pool).await?;

            Ok(Stores {
                events: Arc::new(SqliteEventStore::new(pool.clone())),
                actions: Arc::new(SqliteActionStore::new(pool.clone())),
                recordings: Arc::new(SqliteRecordingStore::new(pool)),
            })
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            info!("Storage: postgres");

            let pool = sqlx::PgPool::connect(&config.postgres.uri).await?;
            sql::postgres::init_schema(&pool).await?;

            Ok(Stores {
                events: Arc::new(PostgresEventStore::new(pool.clone())),
                actions: Arc::new(PostgresActionStore::new(pool.clone())),
                recordings: Arc::new(PostgresRecordingStore::new(pool)),
            })
        }
        #[allow(unreachable_patterns)]
        other => {
            error!(
                "{} storage requested but '{}' feature is not enabled",
                other, other
            );
            Err(format!("{} feature not enabled", other).into())
        }
    }
}
