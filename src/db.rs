use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use sea_orm::{Database, DatabaseConnection, DbErr};
use sqlx::postgres::PgPoolOptions;

use crate::error::{AppError, AppResult};

pub type DbPool = sqlx::PgPool;

/// Create the sqlx pool used by the audit writer and the migration runner.
pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let conn = Database::connect(database_url).await?;
    Ok(conn)
}

/// Whether the enclosing data access reads or mutates. Passed explicitly at
/// every call site; never derived from ambient state, because one request can
/// mix both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbRole {
    Primary,
    Replica,
}

/// Primary/replica pair. Read-only accesses go to the replica, everything
/// else to the primary. A replica that cannot be reached is surfaced as a
/// retryable error by `read_with_retries`; it is never swapped for the
/// primary at call time.
#[derive(Clone)]
pub struct DbRouter {
    primary: DatabaseConnection,
    replica: DatabaseConnection,
}

impl DbRouter {
    pub fn new(primary: DatabaseConnection, replica: DatabaseConnection) -> Self {
        Self { primary, replica }
    }

    pub fn select(mode: AccessMode) -> DbRole {
        match mode {
            AccessMode::ReadOnly => DbRole::Replica,
            AccessMode::ReadWrite => DbRole::Primary,
        }
    }

    pub fn conn(&self, mode: AccessMode) -> &DatabaseConnection {
        match Self::select(mode) {
            DbRole::Primary => &self.primary,
            DbRole::Replica => &self.replica,
        }
    }
}

/// Insert-time unique violations on merchant references are a
/// generate-and-retry signal, not a fatal error.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(sea_orm::SqlErr::UniqueConstraintViolation(_)))
}

const READ_ATTEMPTS: u32 = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

fn is_transport_error(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

/// Run a replica-routed read, retrying transport failures a bounded number of
/// times against the same replica before surfacing `Unavailable`.
pub async fn read_with_retries<T, F, Fut>(op: F) -> AppResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transport_error(&err) => {
                attempt += 1;
                if attempt >= READ_ATTEMPTS {
                    tracing::warn!(error = %err, attempts = attempt, "replica read failed");
                    return Err(AppError::Unavailable("read replica".into()));
                }
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_route_to_replica() {
        assert_eq!(DbRouter::select(AccessMode::ReadOnly), DbRole::Replica);
    }

    #[test]
    fn writes_route_to_primary() {
        assert_eq!(DbRouter::select(AccessMode::ReadWrite), DbRole::Primary);
    }

    #[tokio::test]
    async fn transport_errors_exhaust_into_unavailable() {
        let result: AppResult<()> =
            read_with_retries(|| async { Err(DbErr::Conn(sea_orm::RuntimeErr::Internal("refused".into()))) })
                .await;
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[tokio::test]
    async fn non_transport_errors_propagate_unretried() {
        let result: AppResult<()> = read_with_retries(|| async {
            Err(DbErr::Custom("constraint violated".into()))
        })
        .await;
        assert!(matches!(result, Err(AppError::OrmError(_))));
    }
}
