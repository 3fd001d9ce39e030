//! In-memory identity service with scriptable failures, for tests.
//!
//! Sign-in, sign-up and sign-out announce themselves on the change hub the
//! same way the hosted client does.

use crate::domains::profile::{ProfilePatch, ProfileRow};
use crate::errors::{IdentityError, IdentityResult};
use crate::identity::{
    IdentityService, RemoteSession, RemoteUser, SessionChange, SessionChangeHub, SessionChangeSubscription,
};
use crate::types::{AuthChangeEvent, UserRole};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

#[derive(Default)]
struct Store {
    accounts: HashMap<String, (String, Uuid)>,
    profiles: HashMap<Uuid, ProfileRow>,
    current: Option<RemoteSession>,
    issued: usize,
}

#[derive(Default)]
pub struct ScriptedIdentityService {
    hub: SessionChangeHub,
    store: Mutex<Store>,
    unreachable: AtomicBool,
    fail_profile_reads: AtomicBool,
    fail_profile_insert: AtomicBool,
    fail_profile_update: AtomicBool,
    fail_sign_out: AtomicBool,
    sign_out_calls: AtomicUsize,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
    read_started: Notify,
}

impl ScriptedIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account with a matching profile row; returns the user id
    pub fn add_account(&self, email: &str, secret: &str, name: &str, role: UserRole) -> Uuid {
        let id = Uuid::new_v4();
        let mut store = self.store.lock().unwrap();
        store.accounts.insert(email.to_string(), (secret.to_string(), id));
        store.profiles.insert(
            id,
            ProfileRow {
                id: id.to_string(),
                email: email.to_string(),
                full_name: Some(name.to_string()),
                role: role.as_str().to_string(),
                organization: None,
                verified: role == UserRole::Admin,
                avatar_url: None,
                created_at: None,
                updated_at: None,
            },
        );
        id
    }

    pub fn remove_profile(&self, user_id: Uuid) {
        self.store.lock().unwrap().profiles.remove(&user_id);
    }

    pub fn profile(&self, user_id: Uuid) -> Option<ProfileRow> {
        self.store.lock().unwrap().profiles.get(&user_id).cloned()
    }

    /// Mint a session for a user without going through sign-in
    pub fn issue_session(&self, user_id: Uuid, expires_at: i64) -> RemoteSession {
        let mut store = self.store.lock().unwrap();
        store.issued += 1;
        let email = store
            .accounts
            .iter()
            .find(|(_, (_, id))| *id == user_id)
            .map(|(email, _)| email.clone());
        RemoteSession {
            access_token: format!("token-{}-{}", user_id, store.issued),
            refresh_token: Some(format!("refresh-{}", store.issued)),
            expires_at: Some(expires_at),
            user: RemoteUser { id: user_id, email },
        }
    }

    pub fn set_current_session(&self, session: Option<RemoteSession>) {
        self.store.lock().unwrap().current = session;
    }

    pub fn current_session(&self) -> Option<RemoteSession> {
        self.store.lock().unwrap().current.clone()
    }

    /// Deliver a notification to every subscriber
    pub fn emit(&self, event: AuthChangeEvent, session: Option<RemoteSession>) {
        self.hub.publish(SessionChange::new(event, session));
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    pub fn set_unreachable(&self, value: bool) {
        self.unreachable.store(value, Ordering::SeqCst);
    }

    pub fn fail_profile_reads(&self, value: bool) {
        self.fail_profile_reads.store(value, Ordering::SeqCst);
    }

    pub fn fail_profile_insert(&self, value: bool) {
        self.fail_profile_insert.store(value, Ordering::SeqCst);
    }

    pub fn fail_profile_update(&self, value: bool) {
        self.fail_profile_update.store(value, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self, value: bool) {
        self.fail_sign_out.store(value, Ordering::SeqCst);
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    /// Hold every profile read until a permit is added to the returned gate
    pub fn gate_profile_reads(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.read_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a profile read has reached the gate
    pub async fn profile_read_started(&self) {
        self.read_started.notified().await;
    }

    fn check_reachable(&self) -> IdentityResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(IdentityError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityService for ScriptedIdentityService {
    async fn get_current_session(&self) -> IdentityResult<Option<RemoteSession>> {
        self.check_reachable()?;
        Ok(self.current_session())
    }

    async fn sign_in_with_credentials(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession> {
        self.check_reachable()?;
        let user_id = {
            let store = self.store.lock().unwrap();
            match store.accounts.get(email) {
                Some((stored, id)) if stored == secret => *id,
                _ => return Err(IdentityError::InvalidCredentials("Invalid login credentials".to_string())),
            }
        };
        let session = self.issue_session(user_id, Utc::now().timestamp() + 3600);
        self.set_current_session(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, secret: &str) -> IdentityResult<RemoteSession> {
        self.check_reachable()?;
        let user_id = Uuid::new_v4();
        {
            let mut store = self.store.lock().unwrap();
            if store.accounts.contains_key(email) {
                return Err(IdentityError::DuplicateAccount("User already registered".to_string()));
            }
            store.accounts.insert(email.to_string(), (secret.to_string(), user_id));
        }
        let session = self.issue_session(user_id, Utc::now().timestamp() + 3600);
        self.set_current_session(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.check_reachable().and_then(|_| {
            if self.fail_sign_out.load(Ordering::SeqCst) {
                Err(IdentityError::Remote { status: 500, message: "logout failed".to_string() })
            } else {
                Ok(())
            }
        });

        // Like the hosted client, the local copy goes whatever the server said
        self.set_current_session(None);
        self.hub.publish(SessionChange::signed_out());
        result
    }

    fn on_session_change(&self) -> SessionChangeSubscription {
        self.hub.subscribe()
    }

    async fn select_profile(&self, user_id: Uuid) -> IdentityResult<Option<ProfileRow>> {
        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.read_started.notify_one();
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.check_reachable()?;
        if self.fail_profile_reads.load(Ordering::SeqCst) {
            return Err(IdentityError::Transport("profile read timed out".to_string()));
        }
        Ok(self.profile(user_id))
    }

    async fn insert_profile(&self, row: &ProfileRow) -> IdentityResult<ProfileRow> {
        self.check_reachable()?;
        if self.fail_profile_insert.load(Ordering::SeqCst) {
            return Err(IdentityError::Remote { status: 403, message: "new row violates row-level security policy".to_string() });
        }
        let id = Uuid::parse_str(&row.id).map_err(|e| IdentityError::Decode(e.to_string()))?;
        self.store.lock().unwrap().profiles.insert(id, row.clone());
        Ok(row.clone())
    }

    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch) -> IdentityResult<ProfileRow> {
        self.check_reachable()?;
        if self.fail_profile_update.load(Ordering::SeqCst) {
            return Err(IdentityError::Transport("connection reset".to_string()));
        }
        let mut store = self.store.lock().unwrap();
        let row = store
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| IdentityError::NotFound(format!("profiles/{}", user_id)))?;
        if let Some(name) = &patch.full_name {
            row.full_name = Some(name.clone());
        }
        if let Some(organization) = &patch.organization {
            row.organization = Some(organization.clone());
        }
        if let Some(avatar) = &patch.avatar_url {
            row.avatar_url = Some(avatar.clone());
        }
        row.updated_at = Some(patch.updated_at.clone());
        Ok(row.clone())
    }
}
