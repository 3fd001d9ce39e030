use log::{info, warn};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_IDENTITY_URL: &str = "REFUGEE_AID_IDENTITY_URL";
pub const ENV_IDENTITY_ANON_KEY: &str = "REFUGEE_AID_IDENTITY_ANON_KEY";
pub const ENV_AUTH_SESSION: &str = "REFUGEE_AID_AUTH_SESSION";
pub const ENV_SESSION_CACHE: &str = "REFUGEE_AID_SESSION_CACHE";
pub const ENV_OFFLINE_DB: &str = "REFUGEE_AID_OFFLINE_DB";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "REFUGEE_AID_HTTP_TIMEOUT_SECS";

const DEFAULT_AUTH_SESSION: &str = "./storage/auth_session.json";
const DEFAULT_SESSION_CACHE: &str = "./storage/session_cache.json";
const DEFAULT_OFFLINE_DB: &str = "sqlite://./storage/emergency.sqlite";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Where the hosted identity service lives, if anywhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityConfig {
    Hosted {
        url: String,
        anon_key: String,
        /// File the issued auth session is persisted to
        auth_store: Option<PathBuf>,
    },
    Unconfigured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub session_cache_path: PathBuf,
    pub offline_db_url: String,
    pub http_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Load from the process environment, reading a `.env` file first if present
    pub fn from_env() -> Self {
        if dotenv::dotenv().is_ok() {
            info!("Loaded environment overrides from .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Missing identity settings are not an
    /// error; they leave the identity service unconfigured.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let identity = match (value(ENV_IDENTITY_URL), value(ENV_IDENTITY_ANON_KEY)) {
            (Some(url), Some(anon_key)) => IdentityConfig::Hosted {
                url,
                anon_key,
                auth_store: Some(PathBuf::from(
                    value(ENV_AUTH_SESSION).unwrap_or_else(|| DEFAULT_AUTH_SESSION.to_string()),
                )),
            },
            (url, key) => {
                if url.is_some() || key.is_some() {
                    warn!(
                        "Incomplete identity settings: both {} and {} are required",
                        ENV_IDENTITY_URL, ENV_IDENTITY_ANON_KEY
                    );
                }
                IdentityConfig::Unconfigured
            }
        };

        let timeout_secs = try_load(&value, ENV_HTTP_TIMEOUT_SECS, DEFAULT_HTTP_TIMEOUT_SECS);

        Self {
            identity,
            session_cache_path: PathBuf::from(try_load(&value, ENV_SESSION_CACHE, DEFAULT_SESSION_CACHE.to_string())),
            offline_db_url: try_load(&value, ENV_OFFLINE_DB, DEFAULT_OFFLINE_DB.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

fn try_load<T>(value: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = value(key) else {
        info!("{} not set, using default: {}", key, default);
        return default;
    };

    raw.parse().unwrap_or_else(|e| {
        warn!("Invalid {} value '{}': {}, using default: {}", key, raw, e, default);
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_is_unconfigured_with_defaults() {
        let config = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(config.identity, IdentityConfig::Unconfigured);
        assert_eq!(config.session_cache_path, PathBuf::from(DEFAULT_SESSION_CACHE));
        assert_eq!(config.offline_db_url, DEFAULT_OFFLINE_DB);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }

    #[test]
    fn url_and_key_configure_the_hosted_service() {
        let config = AppConfig::from_lookup(lookup(&[
            (ENV_IDENTITY_URL, "https://aid.example.org"),
            (ENV_IDENTITY_ANON_KEY, "anon"),
            (ENV_HTTP_TIMEOUT_SECS, "5"),
        ]));
        match config.identity {
            IdentityConfig::Hosted { url, anon_key, auth_store } => {
                assert_eq!(url, "https://aid.example.org");
                assert_eq!(anon_key, "anon");
                assert_eq!(auth_store, Some(PathBuf::from(DEFAULT_AUTH_SESSION)));
            }
            other => panic!("unexpected identity config: {:?}", other),
        }
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn half_configured_identity_stays_unconfigured() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_IDENTITY_URL, "https://aid.example.org"), (ENV_IDENTITY_ANON_KEY, "  ")]));
        assert_eq!(config.identity, IdentityConfig::Unconfigured);
    }

    #[test]
    fn bad_timeout_falls_back_to_default() {
        let config = AppConfig::from_lookup(lookup(&[(ENV_HTTP_TIMEOUT_SECS, "soon")]));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
    }
}
