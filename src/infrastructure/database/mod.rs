pub mod entities;
pub mod migrator;
pub mod repositories;

use std::time::Duration;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use migrator::Migrator;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://./courtbook.db?mode=rwc")
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./courtbook.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout_secs: 8,
        }
    }
}

impl DatabaseConfig {
    /// Create config for SQLite
    pub fn sqlite(path: &str) -> Self {
        Self {
            url: format!("sqlite://{}?mode=rwc", path),
            ..Self::default()
        }
    }

    /// Private in-memory SQLite database.
    ///
    /// Pinned to a single connection: every new connection to
    /// `sqlite::memory:` opens a fresh, empty database.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut opts = ConnectOptions::new(self.url.clone());
        opts.max_connections(self.max_connections.max(1))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .sqlx_logging(false);
        if self.url.starts_with("sqlite::memory:") {
            opts.min_connections(1).max_connections(1);
        }
        opts
    }
}

/// Initialize database connection
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    info!("Connecting to database: {}", redact_url(&config.url));
    let db = Database::connect(config.connect_options()).await?;
    let backend = db.get_database_backend();
    info!(backend = ?backend, "Database connected successfully");
    if !supports_row_locks(backend) {
        info!("No row locks on this backend: booking writes serialize on the database write lock");
    }
    Ok(db)
}

/// Apply pending migrations
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    info!("Running database migrations...");
    Migrator::up(db, None).await?;
    info!("Database migrations completed");
    Ok(())
}

/// Whether the backend honors `SELECT ... FOR UPDATE` and SERIALIZABLE.
/// Without them the repositories take the database write lock up front.
pub fn supports_row_locks(backend: DatabaseBackend) -> bool {
    matches!(backend, DatabaseBackend::Postgres | DatabaseBackend::MySql)
}

/// Strip credentials from a connection URL before logging it
pub fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("postgres://booking:secret@db:5432/courtbook"),
            "postgres://***@db:5432/courtbook"
        );
        assert_eq!(
            redact_url("sqlite://./courtbook.db?mode=rwc"),
            "sqlite://./courtbook.db?mode=rwc"
        );
    }

    #[test]
    fn test_in_memory_is_single_connection() {
        let cfg = DatabaseConfig::in_memory();
        assert_eq!(cfg.max_connections, 1);
        assert!(cfg.url.starts_with("sqlite::memory:"));
    }

    #[test]
    fn test_row_lock_support() {
        assert!(supports_row_locks(DatabaseBackend::Postgres));
        assert!(!supports_row_locks(DatabaseBackend::Sqlite));
    }

    #[tokio::test]
    async fn test_migrations_apply_on_sqlite() {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        run_migrations(&db).await.unwrap();
        // Idempotent
        run_migrations(&db).await.unwrap();
    }
}
