use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend};
use sea_orm_migration::MigratorTrait;
use tracing::{debug, error, info, warn};

use crate::{config::AppConfig, errors::ServiceError, migrator::Migrator};

pub type DbPool = DatabaseConnection;

/// Every connection to `sqlite::memory:` opens a fresh, empty database
fn is_in_memory_sqlite(url: &str) -> bool {
    url.starts_with("sqlite") && url.contains(":memory:")
}

fn connect_options(cfg: &AppConfig) -> ConnectOptions {
    let (max, min) = if is_in_memory_sqlite(&cfg.database_url) {
        (1, 1)
    } else {
        (cfg.db_max_connections, cfg.db_min_connections)
    };

    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(max)
        .min_connections(min)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(cfg.db_idle_timeout_secs))
        .sqlx_logging(false);
    options
}

/// Opens the pool described by the database section of the configuration
pub async fn connect(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let options = connect_options(cfg);
    let max = options.get_max_connections().unwrap_or(cfg.db_max_connections);
    gauge!("bakery_db.max_connections", f64::from(max));

    let pool = Database::connect(options).await.map_err(|e| {
        error!(error = %e, "could not open database pool");
        ServiceError::DatabaseError(e)
    })?;

    info!(max_connections = max, backend = ?pool.get_database_backend(), "database pool ready");
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match Migrator::up(pool, None).await {
        Ok(()) => {
            info!(elapsed = ?started.elapsed(), "migrations applied");
            Ok(())
        }
        Err(e) => {
            error!(elapsed = ?started.elapsed(), error = %e, "migrations failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

/// Round trip used by the readiness check
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    let started = Instant::now();
    match pool.ping().await {
        Ok(()) => {
            let elapsed = started.elapsed();
            gauge!("bakery_db.ping_ms", elapsed.as_secs_f64() * 1_000.0);
            debug!(?elapsed, "database ping");
            Ok(())
        }
        Err(e) => {
            counter!("bakery_db.ping_failures", 1);
            error!(error = %e, "database ping failed");
            Err(ServiceError::DatabaseError(e))
        }
    }
}

/// `SELECT ... FOR UPDATE` is only issued where the backend supports it.
/// SQLite serializes writers on the whole database instead.
pub fn supports_row_locks(pool: &DbPool) -> bool {
    matches!(pool.get_database_backend(), DbBackend::Postgres | DbBackend::MySql)
}

/// Duration and outcome of a service transaction, labelled by operation
pub fn record_transaction(operation: &'static str, started: Instant, committed: bool) {
    let elapsed = started.elapsed();
    histogram!("bakery_db.transaction.duration", elapsed, "operation" => operation);

    if committed {
        counter!("bakery_db.transaction.committed", 1, "operation" => operation);
        debug!(operation, ?elapsed, "transaction committed");
    } else {
        counter!("bakery_db.transaction.rolled_back", 1, "operation" => operation);
        warn!(operation, ?elapsed, "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            0,
            "test".into(),
        )
    }

    #[test]
    fn in_memory_sqlite_is_pinned_to_one_connection() {
        let options = connect_options(&memory_config());
        assert_eq!(options.get_max_connections(), Some(1));
        assert_eq!(options.get_min_connections(), Some(1));

        let mut file_backed = memory_config();
        file_backed.database_url = "sqlite://bakery.db?mode=rwc".into();
        assert_eq!(connect_options(&file_backed).get_max_connections(), Some(10));
    }

    #[tokio::test]
    async fn connects_and_migrates_in_memory_sqlite() {
        let pool = connect(&memory_config()).await.unwrap();
        assert!(check_connection(&pool).await.is_ok());
        assert!(run_migrations(&pool).await.is_ok());
        assert!(!supports_row_locks(&pool));
    }
}
