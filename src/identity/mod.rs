//! Contract with the hosted identity service (authentication plus the
//! `profiles` row store) and its implementations.

pub mod backend;
pub mod hub;
pub mod rest;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::IdentityBackend;
pub use hub::{SessionChangeHub, SessionChangeSubscription};
pub use rest::RestIdentityService;

use crate::domains::profile::{ProfilePatch, ProfileRow};
use crate::errors::IdentityResult;
use crate::types::AuthChangeEvent;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User record attached to a remote session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// A session as issued by the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds. When absent the access token's `exp` claim is used.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: RemoteUser,
}

impl RemoteSession {
    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn expiry(&self) -> Option<i64> {
        self.expires_at.or_else(|| token::expires_at(&self.access_token))
    }

    /// Sessions without any readable expiry are treated as live.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expiry().map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp())
    }
}

/// One change notification from the identity service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    pub event: AuthChangeEvent,
    pub session: Option<RemoteSession>,
}

impl SessionChange {
    pub fn new(event: AuthChangeEvent, session: Option<RemoteSession>) -> Self {
        Self { event, session }
    }

    pub fn signed_out() -> Self {
        Self::new(AuthChangeEvent::SignedOut, None)
    }
}

/// Operations the client consumes from the identity service
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Session currently held by the service client, if any
    async fn get_current_session(&self) -> IdentityResult<Option<RemoteSession>>;

    async fn sign_in_with_credentials(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession>;

    async fn sign_up(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession>;

    /// Best-effort remote sign-out
    async fn sign_out(&self) -> IdentityResult<()>;

    /// Register for change notifications. Dropping or unsubscribing the
    /// returned handle releases the registration.
    fn on_session_change(&self) -> SessionChangeSubscription;

    async fn select_profile(&self, user_id: Uuid) -> IdentityResult<Option<ProfileRow>>;

    async fn insert_profile(&self, row: &ProfileRow) -> IdentityResult<ProfileRow>;

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> IdentityResult<ProfileRow>;
}
