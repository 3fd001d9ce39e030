use crate::config::IdentityConfig;
use crate::errors::{IdentityError, ServiceError, ServiceResult};
use crate::identity::{IdentityService, RestIdentityService};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Identity backend, resolved once at startup.
///
/// Without configuration every identity operation fails fast with
/// [`ServiceError::Configuration`] instead of reaching a stand-in client.
#[derive(Clone)]
pub enum IdentityBackend {
    Configured(Arc<dyn IdentityService>),
    Unconfigured,
}

impl IdentityBackend {
    pub fn from_config(config: &IdentityConfig, timeout: Duration) -> Self {
        match config {
            IdentityConfig::Hosted { url, anon_key, auth_store } => {
                match RestIdentityService::new(url, anon_key, timeout) {
                    Ok(service) => {
                        info!("Identity service configured at {}", url);
                        let service = match auth_store {
                            Some(path) => service.with_session_file(path),
                            None => service,
                        };
                        IdentityBackend::Configured(Arc::new(service))
                    }
                    Err(e) => {
                        warn!("Identity service client could not be built: {}", e);
                        IdentityBackend::Unconfigured
                    }
                }
            }
            IdentityConfig::Unconfigured => {
                warn!("Identity service is not configured; running signed-out only");
                IdentityBackend::Unconfigured
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, IdentityBackend::Configured(_))
    }

    pub fn service(&self) -> ServiceResult<&Arc<dyn IdentityService>> {
        match self {
            IdentityBackend::Configured(service) => Ok(service),
            IdentityBackend::Unconfigured => Err(ServiceError::from(IdentityError::Unconfigured)),
        }
    }
}

impl std::fmt::Debug for IdentityBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityBackend::Configured(_) => f.write_str("IdentityBackend::Configured"),
            IdentityBackend::Unconfigured => f.write_str("IdentityBackend::Unconfigured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorClass;

    #[test]
    fn unconfigured_backend_short_circuits() {
        let backend = IdentityBackend::from_config(&IdentityConfig::Unconfigured, Duration::from_secs(5));
        assert!(!backend.is_configured());
        let err = backend.service().err().unwrap();
        assert!(matches!(err, ServiceError::Configuration(_)));
        assert_eq!(err.class(), ErrorClass::RecoverableNetwork);
    }

    #[test]
    fn hosted_config_builds_rest_client() {
        let config = IdentityConfig::Hosted {
            url: "https://aid.example.org".to_string(),
            anon_key: "anon".to_string(),
            auth_store: None,
        };
        let backend = IdentityBackend::from_config(&config, Duration::from_secs(5));
        assert!(backend.is_configured());
        assert!(backend.service().is_ok());
    }
}
