//! Pieces that keep the app useful without a network: install state, the
//! locally stored emergency information and the offline fallback page.

pub mod emergency;
pub mod fallback;
pub mod install;

pub use emergency::{EmergencyInfo, EmergencyInfoStore, EmergencySection};
pub use fallback::{render_offline_page, FetchedPage, OfflineFallback, CACHE_NAME, OFFLINE_URL};
pub use install::{DeferredInstallPrompt, InstallChoice, InstallController, InstallOutcome};

use crate::errors::DbResult;
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Open the local document store, creating the database file if needed, and
/// apply pending migrations
pub async fn open_store(database_url: &str) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::errors::DbError::Other(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    crate::db_migration::initialize_database(&pool).await?;
    debug!("Local store opened at {}", database_url);
    Ok(pool)
}

/// Single-connection in-memory store; every connection would otherwise see its own database
#[cfg(test)]
pub(crate) async fn memory_pool() -> DbResult<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
