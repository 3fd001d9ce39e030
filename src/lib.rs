use std::sync::Arc;

// Public modules
pub mod auth;
pub mod config;
pub mod domains;
pub mod errors;
pub mod identity;
pub mod offline;
pub mod types;
pub mod validation;

// Private modules
mod db_migration;

use auth::{FileSessionCache, SessionController};
use config::AppConfig;
use errors::{DomainError, ServiceResult};
use identity::IdentityBackend;
use log::info;
use offline::{EmergencyInfoStore, InstallController, OfflineFallback};

/// Everything the presentation layer talks to
pub struct AppCore {
    pub session: Arc<SessionController>,
    pub install: InstallController,
    pub emergency: EmergencyInfoStore,
    pub fallback: OfflineFallback,
}

impl AppCore {
    /// Stop background work. The session itself is left as it is.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}

// Entry point for initialization
/// Build the application core and resolve the startup session.
///
/// An unreachable or unconfigured identity service is not an error here: the
/// session simply starts anonymous with a warning. Only a local store that
/// cannot be opened fails initialization.
pub async fn initialize(config: AppConfig) -> ServiceResult<AppCore> {
    let _ = env_logger::try_init();

    let pool = offline::open_store(&config.offline_db_url)
        .await
        .map_err(DomainError::from)?;
    let emergency = EmergencyInfoStore::new(pool);
    let fallback = OfflineFallback::new(emergency.clone(), config.http_timeout)?;

    let backend = IdentityBackend::from_config(&config.identity, config.http_timeout);
    let cache = Arc::new(FileSessionCache::new(config.session_cache_path.clone()));
    let session = Arc::new(SessionController::new(backend, cache));
    let resolved = session.bootstrap().await;
    info!("Core initialized, session {}", resolved.status().as_str());

    Ok(AppCore {
        session,
        install: InstallController::new(),
        emergency,
        fallback,
    })
}
