use crate::errors::{DbError, DbResult};
use log::{debug, info, warn};
use sqlx::SqlitePool;

// Embed all migration SQL files at compile time
const MIGRATION_OFFLINE_DOCUMENTS: &str = include_str!("../migrations/20250601000000_offline_documents.sql");

// List of migrations with their names and SQL content, in application order
const MIGRATIONS: &[(&str, &str)] = &[
    ("20250601000000_offline_documents.sql", MIGRATION_OFFLINE_DOCUMENTS),
];

/// Bring the local store up to date
pub async fn initialize_database(pool: &SqlitePool) -> DbResult<()> {
    debug!("Starting local store migration");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => debug!("Last applied migration: {}", name),
        None => debug!("No migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await
}

async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    let result = sqlx::query_scalar::<_, String>(
        "SELECT name FROM migrations ORDER BY id DESC LIMIT 1"
    )
    .fetch_optional(pool)
    .await?;

    Ok(result)
}

async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending = get_pending_migrations(last_migration.as_deref());
    if pending.is_empty() {
        debug!("No pending migrations");
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    for (migration_name, migration_sql) in pending {
        sqlx::query(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to apply migration {}: {}", migration_name, e)))?;

        sqlx::query("INSERT INTO migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to record migration {}: {}", migration_name, e)))?;

        info!("Applied migration {}", migration_name);
    }

    tx.commit().await?;
    Ok(())
}

/// Migrations that come after `last_migration` (all of them when none was applied)
fn get_pending_migrations(last_migration: Option<&str>) -> Vec<(&'static str, &'static str)> {
    let mut pending = Vec::new();
    let mut should_include = last_migration.is_none();

    for &(migration_name, migration_sql) in MIGRATIONS {
        if should_include {
            pending.push((migration_name, migration_sql));
        } else if Some(migration_name) == last_migration {
            should_include = true;
        }
    }

    if let (Some(name), false) = (last_migration, should_include) {
        warn!("Last applied migration {} is unknown to this build; nothing applied", name);
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_migrations_follow_the_last_applied_one() {
        assert_eq!(get_pending_migrations(None).len(), MIGRATIONS.len());
        let last = MIGRATIONS[MIGRATIONS.len() - 1].0;
        assert!(get_pending_migrations(Some(last)).is_empty());
    }

    #[test]
    fn unknown_last_migration_applies_nothing() {
        assert!(get_pending_migrations(Some("29990101000000_from_a_newer_build.sql")).is_empty());
    }

    #[tokio::test]
    async fn migrations_are_applied_once() {
        let pool = crate::offline::memory_pool().await.unwrap();
        initialize_database(&pool).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
