use crate::domains::profile::{ProfilePatch, ProfileRow};
use crate::errors::{IdentityError, IdentityResult};
use crate::identity::{
    IdentityService, RemoteSession, RemoteUser, SessionChange, SessionChangeHub, SessionChangeSubscription,
};
use crate::types::AuthChangeEvent;
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const PROFILES_TABLE: &str = "profiles";

/// Token endpoint payload
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: RemoteUser,
}

impl TokenResponse {
    fn into_session(self) -> RemoteSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        RemoteSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Identity service client for the hosted auth + REST row API
pub struct RestIdentityService {
    client: Client,
    base_url: String,
    anon_key: String,
    hub: SessionChangeHub,
    session: Mutex<Option<RemoteSession>>,
    session_file: Option<PathBuf>,
}

impl RestIdentityService {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> IdentityResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            hub: SessionChangeHub::new(),
            session: Mutex::new(None),
            session_file: None,
        })
    }

    /// Persist the issued session so it survives restarts
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn rest_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/rest/v1/{}", self.base_url, table)
        } else {
            format!("{}/rest/v1/{}?{}", self.base_url, table, query)
        }
    }

    fn profile_filter(user_id: Uuid) -> String {
        format!("id=eq.{}", urlencoding::encode(&user_id.to_string()))
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<RemoteSession>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Rows are read with the user's token when signed in, the anon key otherwise
    fn bearer(&self) -> String {
        let token = self
            .lock_session()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, self.bearer())
    }

    fn store_session(&self, session: Option<RemoteSession>) {
        *self.lock_session() = session.clone();

        let Some(path) = &self.session_file else { return };
        let result = match &session {
            Some(s) => write_session_file(path, s),
            None => remove_session_file(path),
        };
        if let Err(e) = result {
            error!("Failed to persist auth session to {}: {}", path.display(), e);
        }
    }

    fn load_persisted(&self) -> Option<RemoteSession> {
        let path = self.session_file.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<RemoteSession>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Discarding unreadable auth session file {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn token_request(&self, grant_type: &str, body: serde_json::Value) -> IdentityResult<RemoteSession> {
        let url = format!("{}?grant_type={}", self.auth_url("token"), grant_type);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        let token = response.json::<TokenResponse>().await?;
        Ok(token.into_session())
    }

    async fn refresh(&self, refresh_token: &str) -> IdentityResult<RemoteSession> {
        debug!("Refreshing expired access token");
        self.token_request("refresh_token", serde_json::json!({ "refresh_token": refresh_token }))
            .await
    }

    async fn fetch_user(&self, access_token: &str) -> IdentityResult<RemoteUser> {
        let response = self
            .client
            .get(self.auth_url("user"))
            .header("apikey", &self.anon_key)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<RemoteUser>().await?)
    }

    async fn rows(&self, response: Response) -> IdentityResult<Vec<ProfileRow>> {
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.json::<Vec<ProfileRow>>().await?)
    }
}

#[async_trait]
impl IdentityService for RestIdentityService {
    async fn get_current_session(&self) -> IdentityResult<Option<RemoteSession>> {
        let held = self.lock_session().clone();
        let Some(mut session) = held.or_else(|| self.load_persisted()) else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Some(refresh_token) = session.refresh_token.clone() {
                match self.refresh(&refresh_token).await {
                    Ok(fresh) => {
                        self.store_session(Some(fresh.clone()));
                        self.hub.publish(SessionChange::new(AuthChangeEvent::TokenRefreshed, Some(fresh.clone())));
                        return Ok(Some(fresh));
                    }
                    Err(IdentityError::Transport(msg)) => return Err(IdentityError::Transport(msg)),
                    Err(e) => warn!("Token refresh rejected: {}", e),
                }
            }
            // Expired and not refreshable; the caller decides what to do with it
            return Ok(Some(session));
        }

        match self.fetch_user(&session.access_token).await {
            Ok(user) => {
                session.user = user;
                self.store_session(Some(session.clone()));
                Ok(Some(session))
            }
            Err(IdentityError::SessionRejected(msg)) => {
                info!("Stored session no longer accepted: {}", msg);
                self.store_session(None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_credentials(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession> {
        let session = self
            .token_request("password", serde_json::json!({ "email": email, "password": secret }))
            .await?;
        self.store_session(Some(session.clone()));
        self.hub.publish(SessionChange::new(AuthChangeEvent::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession> {
        let response = self
            .client
            .post(self.auth_url("signup"))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({ "email": email, "password": secret }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        // Projects with email confirmation enabled return the bare user
        let body = response.json::<serde_json::Value>().await?;
        if body.get("access_token").is_none() {
            return Err(IdentityError::ConfirmationRequired(email.to_string()));
        }
        let session = serde_json::from_value::<TokenResponse>(body)
            .map_err(|e| IdentityError::Decode(e.to_string()))?
            .into_session();

        self.store_session(Some(session.clone()));
        self.hub.publish(SessionChange::new(AuthChangeEvent::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        let held = self.lock_session().clone();
        let result = match held {
            Some(session) => {
                let response = self
                    .client
                    .post(self.auth_url("logout"))
                    .header("apikey", &self.anon_key)
                    .header(AUTHORIZATION, format!("Bearer {}", session.access_token))
                    .send()
                    .await;
                match response {
                    Ok(r) if r.status().is_success() => Ok(()),
                    Ok(r) => Err(error_from_response(r).await),
                    Err(e) => Err(IdentityError::from(e)),
                }
            }
            None => Ok(()),
        };

        // The local copy goes regardless of what the server said
        self.store_session(None);
        self.hub.publish(SessionChange::signed_out());
        result
    }

    fn on_session_change(&self) -> SessionChangeSubscription {
        self.hub.subscribe()
    }

    async fn select_profile(&self, user_id: Uuid) -> IdentityResult<Option<ProfileRow>> {
        let url = self.rest_url(PROFILES_TABLE, &format!("{}&select=*", Self::profile_filter(user_id)));
        let response = self.request(Method::GET, &url).send().await?;
        Ok(self.rows(response).await?.into_iter().next())
    }

    async fn insert_profile(&self, row: &ProfileRow) -> IdentityResult<ProfileRow> {
        let url = self.rest_url(PROFILES_TABLE, "");
        let response = self
            .request(Method::POST, &url)
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        self.rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Decode("insert returned no row".to_string()))
    }

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> IdentityResult<ProfileRow> {
        let url = self.rest_url(PROFILES_TABLE, &Self::profile_filter(user_id));
        let response = self
            .request(Method::PATCH, &url)
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;
        self.rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::NotFound(format!("{}/{}", PROFILES_TABLE, user_id)))
    }
}

async fn error_from_response(response: Response) -> IdentityError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to get error details".to_string());
    classify_error(status, &body)
}

/// Map an error response onto the identity error taxonomy
fn classify_error(status: u16, body: &str) -> IdentityError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string());

    let lower = message.to_lowercase();
    match status {
        400 if lower.contains("invalid login credentials") => IdentityError::InvalidCredentials(message),
        400 | 422 if lower.contains("already registered") || lower.contains("already exists") => {
            IdentityError::DuplicateAccount(message)
        }
        401 | 403 if lower.contains("jwt") || lower.contains("token") || lower.contains("session") => {
            IdentityError::SessionRejected(message)
        }
        401 => IdentityError::SessionRejected(message),
        406 => IdentityError::NotFound(message),
        _ => IdentityError::Remote { status, message },
    }
}

fn write_session_file(path: &Path, session: &RemoteSession) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(session)?;
    std::fs::write(path, json)
}

fn remove_session_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
