use crate::auth::cache::SessionCache;
use crate::auth::context::AuthContext;
use crate::auth::epoch::{EpochClock, TokenLedger, TokenVerdict};
use crate::auth::session::{Session, SessionStatus};
use crate::domains::profile::{Credentials, Identity, NewAccount, ProfileRepository, ProfileUpdate};
use crate::errors::{ErrorClass, ServiceError, ServiceResult};
use crate::identity::{IdentityBackend, IdentityService, RemoteSession, SessionChange, SessionChangeSubscription};
use crate::types::{AuthChangeEvent, PendingOperation, Permission, UserRole};
use crate::validation::Validate;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// What the change listener has done with the notifications it received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub applied: u64,
    pub discarded: u64,
}

impl ReconcileStats {
    pub fn handled(&self) -> u64 {
        self.applied + self.discarded
    }
}

type EpochSubscription = (u64, SessionChangeSubscription);

/// Owns the listener task; aborting it releases the change subscription
struct ListenerGuard {
    handle: Option<JoinHandle<()>>,
}

impl ListenerGuard {
    async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Clears the pending flag when the owning operation finishes, however it finishes
struct PendingGuard<'a> {
    state: &'a watch::Sender<Session>,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| s.set_pending(None));
    }
}

/// Marks an epoch as owned by a local operation until it finishes
struct OperationGuard<'a> {
    shared: &'a Shared,
    epoch: u64,
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock_ledger().end_local(self.epoch);
    }
}

struct Shared {
    backend: IdentityBackend,
    cache: Arc<dyn SessionCache>,
    state: watch::Sender<Session>,
    epoch: EpochClock,
    // Also serialises epoch checks with session writes
    ledger: Mutex<TokenLedger>,
    swaps: mpsc::UnboundedSender<EpochSubscription>,
    stats: watch::Sender<ReconcileStats>,
}

impl Shared {
    fn lock_ledger(&self) -> MutexGuard<'_, TokenLedger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn swap_subscription(&self, service: &Arc<dyn IdentityService>, epoch: u64) {
        if self.swaps.send((epoch, service.on_session_change())).is_err() {
            debug!("Change listener stopped; subscription for epoch {} dropped", epoch);
        }
    }

    /// Advance the epoch and move the listener onto a fresh subscription.
    ///
    /// Notifications already queued on the old subscription are dropped with
    /// it. Until the guard drops, the listener leaves the new epoch to the
    /// operation, including notifications the operation itself caused.
    fn begin_operation(&self, service: &Arc<dyn IdentityService>) -> OperationGuard<'_> {
        let mut ledger = self.lock_ledger();
        let epoch = self.epoch.advance();
        ledger.restamp_current(epoch);
        ledger.begin_local(epoch);
        self.swap_subscription(service, epoch);
        OperationGuard { shared: self, epoch }
    }

    /// Write a session if `epoch` is still current, keeping the pending flag
    /// and writing through to the cache.
    fn commit(&self, epoch: u64, next: Session, token: Option<&str>) -> ServiceResult<Session> {
        let mut ledger = self.lock_ledger();
        if !self.epoch.is_current(epoch) {
            return Err(ServiceError::Superseded);
        }
        self.write_state(&mut ledger, epoch, next, token)
    }

    /// Like [`Shared::commit`], but only while `user_id` is still the signed-in user
    fn commit_for_user(&self, epoch: u64, user_id: Uuid, next: Session) -> ServiceResult<Session> {
        let mut ledger = self.lock_ledger();
        let same_user = self.state.borrow().identity().map(|i| i.id) == Some(user_id);
        if !self.epoch.is_current(epoch) || !same_user {
            return Err(ServiceError::Superseded);
        }
        self.write_state(&mut ledger, epoch, next, None)
    }

    fn write_state(
        &self,
        ledger: &mut TokenLedger,
        epoch: u64,
        next: Session,
        token: Option<&str>,
    ) -> ServiceResult<Session> {
        match (next.identity().is_some(), token) {
            (true, Some(token)) => ledger.set_current(token, epoch),
            (true, None) => ledger.restamp_current(epoch),
            (false, _) => {
                if let Some(current) = ledger.current().map(str::to_string) {
                    ledger.retire(&current);
                }
            }
        }

        let pending = self.state.borrow().pending();
        let next = next.with_pending(pending);
        self.state.send_replace(next.clone());
        self.cache.write(&next);
        Ok(next)
    }

    /// Record a token for the signed-in user without touching the identity
    fn record_token(&self, epoch: u64, token: &str) -> ServiceResult<Session> {
        let mut ledger = self.lock_ledger();
        if !self.epoch.is_current(epoch) {
            return Err(ServiceError::Superseded);
        }
        ledger.set_current(token, epoch);
        Ok(self.state.borrow().clone())
    }

    fn sign_out_locally(&self) -> Session {
        let mut ledger = self.lock_ledger();
        let epoch = self.epoch.advance();
        ledger.retire_all();
        if let Ok(service) = self.backend.service() {
            self.swap_subscription(service, epoch);
        }

        let pending = self.state.borrow().pending();
        let next = Session::anonymous().with_pending(pending);
        self.state.send_replace(next.clone());
        self.cache.clear();
        next
    }

    fn is_current_user(&self, user_id: Uuid) -> bool {
        let state = self.state.borrow();
        state.is_logged_in() && state.identity().map(|i| i.id) == Some(user_id)
    }

    fn applied(&self, event: AuthChangeEvent) {
        debug!("Applied {} notification", event.as_str());
        self.stats.send_modify(|s| s.applied += 1);
    }

    fn discarded(&self, event: AuthChangeEvent, reason: &str) {
        debug!("Discarded {} notification: {}", event.as_str(), reason);
        self.stats.send_modify(|s| s.discarded += 1);
    }

    async fn reconcile(&self, epoch: u64, change: SessionChange) {
        let event = change.event;
        if !self.epoch.is_current(epoch) {
            self.discarded(event, "operation epoch advanced");
            return;
        }
        if self.lock_ledger().local_in_flight(epoch) {
            self.discarded(event, "local operation in flight");
            return;
        }
        if event == AuthChangeEvent::SignedOut && self.state.borrow().status() == SessionStatus::Anonymous {
            self.discarded(event, "already signed out");
            return;
        }
        if let Some(remote) = &change.session {
            let (verdict, live) = {
                let ledger = self.lock_ledger();
                (ledger.verdict(&remote.access_token, epoch), ledger.is_current(&remote.access_token))
            };
            match verdict {
                TokenVerdict::Fresh if live && event == AuthChangeEvent::SignedIn => {
                    self.discarded(event, "session already applied");
                    return;
                }
                TokenVerdict::Fresh => {}
                TokenVerdict::Retired => {
                    self.discarded(event, "token retired by sign-out");
                    return;
                }
                TokenVerdict::Stale => {
                    self.discarded(event, "token issued to a superseded operation");
                    return;
                }
            }
        }

        let outcome = match (event, change.session) {
            (AuthChangeEvent::SignedOut, _) | (_, None) => self.commit(epoch, Session::anonymous(), None),
            (_, Some(remote)) if remote.is_expired() => {
                info!("Remote session for {} has expired", remote.user_id());
                self.lock_ledger().retire(&remote.access_token);
                self.commit(epoch, Session::anonymous(), None)
            }
            (AuthChangeEvent::TokenRefreshed, Some(remote)) if self.is_current_user(remote.user_id()) => {
                self.record_token(epoch, &remote.access_token)
            }
            (_, Some(remote)) => self.reconcile_remote(epoch, remote).await,
        };

        match outcome {
            Ok(_) => self.applied(event),
            Err(ServiceError::Superseded) => self.discarded(event, "superseded while fetching profile"),
            Err(e) => {
                warn!("Failed to reconcile {} notification: {}", event.as_str(), e);
                self.discarded(event, "reconciliation failed");
            }
        }
    }

    async fn reconcile_remote(&self, epoch: u64, remote: RemoteSession) -> ServiceResult<Session> {
        let service = self.backend.service()?.clone();
        let user_id = remote.user_id();

        match ProfileRepository::new(service).find_identity(user_id).await {
            Ok(Some(identity)) => {
                self.commit(epoch, Session::authenticated(identity), Some(&remote.access_token))
            }
            Ok(None) => {
                warn!("No profile row for user {}; treating session as anonymous", user_id);
                self.commit(
                    epoch,
                    Session::anonymous().with_warning("Your account has no profile yet. Please contact support."),
                    None,
                )
            }
            Err(e) if e.class() == ErrorClass::RecoverableNetwork => {
                if self.is_current_user(user_id) {
                    warn!("Profile refresh for {} failed, keeping current identity: {}", user_id, e);
                    self.record_token(epoch, &remote.access_token)
                } else {
                    warn!("Profile fetch for {} failed: {}", user_id, e);
                    self.commit(epoch, Session::transient_error(e.user_message()), None)
                }
            }
            Err(e) => {
                warn!("Profile for {} is unusable: {}", user_id, e);
                self.commit(epoch, Session::anonymous().with_warning(e.user_message()), None)
            }
        }
    }
}

async fn run_listener(
    shared: Arc<Shared>,
    mut epoch: u64,
    mut subscription: SessionChangeSubscription,
    mut swaps: mpsc::UnboundedReceiver<EpochSubscription>,
) {
    debug!("Session change listener started at epoch {}", epoch);
    loop {
        tokio::select! {
            biased;

            swap = swaps.recv() => match swap {
                Some((next_epoch, next)) => {
                    epoch = next_epoch;
                    subscription = next;
                }
                None => break,
            },

            change = subscription.recv() => match change {
                Some(change) => shared.reconcile(epoch, change).await,
                None => {
                    debug!("Session change stream closed at epoch {}", epoch);
                    match swaps.recv().await {
                        Some((next_epoch, next)) => {
                            epoch = next_epoch;
                            subscription = next;
                        }
                        None => break,
                    }
                }
            },
        }
    }
    debug!("Session change listener stopped");
}

/// Owns the authoritative [`Session`] and keeps it in step with the identity service.
///
/// Every local mutating operation advances the operation epoch before its
/// remote call. Notifications received under an older epoch, or carrying a
/// token a local sign-out retired, are discarded, so a slow "signed in"
/// notification can never resurrect a session the user has left.
pub struct SessionController {
    shared: Arc<Shared>,
    swaps_rx: Mutex<Option<mpsc::UnboundedReceiver<EpochSubscription>>>,
    listener: Mutex<Option<ListenerGuard>>,
}

impl SessionController {
    pub fn new(backend: IdentityBackend, cache: Arc<dyn SessionCache>) -> Self {
        let (state, _) = watch::channel(Session::bootstrapping(None));
        let (stats, _) = watch::channel(ReconcileStats::default());
        let (swaps, swaps_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(Shared {
                backend,
                cache,
                state,
                epoch: EpochClock::new(),
                ledger: Mutex::new(TokenLedger::default()),
                swaps,
                stats,
            }),
            swaps_rx: Mutex::new(Some(swaps_rx)),
            listener: Mutex::new(None),
        }
    }

    /// Resolve the startup session. Never fails: an unreachable or
    /// unconfigured identity service leaves the application anonymous with a
    /// warning attached.
    pub async fn bootstrap(&self) -> Session {
        let swaps_rx = self
            .swaps_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(swaps_rx) = swaps_rx else {
            warn!("Session controller already bootstrapped");
            return self.session();
        };

        let last_known = self.shared.cache.read().map(|cached| cached.identity);
        if let Some(identity) = &last_known {
            debug!("Restored cached identity {} for display", identity.id);
        }
        self.shared.state.send_replace(Session::bootstrapping(last_known));

        let service = match self.shared.backend.service() {
            Ok(service) => service.clone(),
            Err(e) => {
                warn!("Starting signed out: {}", e);
                let next = Session::anonymous().with_warning(e.user_message());
                self.shared.state.send_replace(next.clone());
                self.shared.cache.clear();
                return next;
            }
        };

        let epoch = self.shared.epoch.current();
        self.start_listener(&service, epoch, swaps_rx);

        let mut token = None;
        let next = match service.get_current_session().await {
            Err(e) => {
                let err = ServiceError::from(e);
                warn!("Identity service unavailable at startup: {}", err);
                Session::anonymous().with_warning(err.user_message())
            }
            Ok(None) => Session::anonymous(),
            Ok(Some(remote)) if remote.is_expired() => {
                info!("Stored session for {} has expired; signing out", remote.user_id());
                self.shared.lock_ledger().retire(&remote.access_token);
                if let Err(e) = service.sign_out().await {
                    warn!("Best-effort sign-out of expired session failed: {}", e);
                }
                Session::anonymous()
            }
            Ok(Some(remote)) => match ProfileRepository::new(service.clone()).find_identity(remote.user_id()).await {
                Ok(Some(identity)) => {
                    token = Some(remote.access_token);
                    Session::authenticated(identity)
                }
                Ok(None) => {
                    warn!("No profile row for user {}", remote.user_id());
                    Session::anonymous().with_warning("Your account has no profile yet. Please contact support.")
                }
                Err(e) => {
                    warn!("Profile fetch failed at startup: {}", e);
                    Session::anonymous().with_warning(e.user_message())
                }
            },
        };

        match self.shared.commit(epoch, next, token.as_deref()) {
            Ok(session) => {
                info!("Bootstrap finished: {}", session.status().as_str());
                session
            }
            Err(_) => {
                debug!("Bootstrap result superseded by a local operation");
                self.settle_bootstrap()
            }
        }
    }

    // A local operation overtook bootstrap; never leave the status at Bootstrapping
    fn settle_bootstrap(&self) -> Session {
        let _ledger = self.shared.lock_ledger();
        self.shared.state.send_if_modified(|s| {
            if s.status() == SessionStatus::Bootstrapping {
                *s = Session::anonymous().with_pending(s.pending());
                true
            } else {
                false
            }
        });
        self.session()
    }

    fn start_listener(
        &self,
        service: &Arc<dyn IdentityService>,
        epoch: u64,
        swaps_rx: mpsc::UnboundedReceiver<EpochSubscription>,
    ) {
        let subscription = service.on_session_change();
        let handle = tokio::spawn(run_listener(self.shared.clone(), epoch, subscription, swaps_rx));
        *self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(ListenerGuard {
            handle: Some(handle),
        });
    }

    fn begin_pending(&self, operation: PendingOperation) -> ServiceResult<PendingGuard<'_>> {
        let mut busy = None;
        self.shared.state.send_if_modified(|s| match s.pending() {
            Some(current) => {
                busy = Some(current);
                false
            }
            None => {
                s.set_pending(Some(operation));
                true
            }
        });

        match busy {
            Some(current) => Err(ServiceError::OperationInProgress(current.as_str().to_string())),
            None => Ok(PendingGuard { state: &self.shared.state }),
        }
    }

    /// Drop a remote session that must not become the local one
    async fn abandon_remote_session(&self, epoch: u64, service: &Arc<dyn IdentityService>, remote: &RemoteSession) {
        self.shared.lock_ledger().retire(&remote.access_token);
        if !self.shared.epoch.is_current(epoch) {
            // A newer operation owns the remote session now
            return;
        }
        if let Err(e) = service.sign_out().await {
            warn!("Best-effort sign-out of user {} failed: {}", remote.user_id(), e);
        }
    }

    pub async fn sign_in(&self, email: &str, secret: &str) -> ServiceResult<Identity> {
        let credentials = Credentials::new(email, secret);
        credentials.validate()?;
        let service = self.shared.backend.service()?.clone();
        let _pending = self.begin_pending(PendingOperation::SigningIn)?;

        let operation = self.shared.begin_operation(&service);
        let epoch = operation.epoch;
        debug!("Sign-in started at epoch {}", epoch);

        let remote = service
            .sign_in_with_credentials(&credentials.email, &credentials.secret)
            .await
            .map_err(|e| {
                let err = ServiceError::from(e);
                info!("Sign-in failed: {}", err);
                err
            })?;
        self.shared.lock_ledger().stamp(&remote.access_token, epoch);

        match self.complete_sign_in(epoch, &service, &remote).await {
            Ok(identity) => {
                info!("Signed in user {} as {}", identity.id, identity.role);
                Ok(identity)
            }
            Err(e) => {
                info!("Sign-in for {} not completed: {}", remote.user_id(), e);
                self.abandon_remote_session(epoch, &service, &remote).await;
                Err(e)
            }
        }
    }

    async fn complete_sign_in(
        &self,
        epoch: u64,
        service: &Arc<dyn IdentityService>,
        remote: &RemoteSession,
    ) -> ServiceResult<Identity> {
        let identity = match ProfileRepository::new(service.clone()).find_identity(remote.user_id()).await? {
            Some(identity) => identity,
            None => {
                warn!("User {} signed in without a profile row", remote.user_id());
                return Err(ServiceError::ProfileNotFound(remote.user_id().to_string()));
            }
        };

        self.shared
            .commit(epoch, Session::authenticated(identity.clone()), Some(&remote.access_token))?;
        Ok(identity)
    }

    /// Create the account, then its profile. The session only becomes
    /// authenticated once both exist.
    pub async fn sign_up(&self, account: NewAccount) -> ServiceResult<Identity> {
        account.validate()?;
        let service = self.shared.backend.service()?.clone();
        let _pending = self.begin_pending(PendingOperation::SigningUp)?;

        let operation = self.shared.begin_operation(&service);
        let epoch = operation.epoch;
        debug!("Sign-up started at epoch {}", epoch);

        let email = account.email.trim().to_string();
        let remote = service.sign_up(&email, &account.secret).await.map_err(|e| {
            let err = ServiceError::from(e);
            info!("Sign-up failed: {}", err);
            err
        })?;
        self.shared.lock_ledger().stamp(&remote.access_token, epoch);

        let row = account.profile_row(remote.user_id(), remote.user.email.as_deref().unwrap_or(&email));
        let created = match ProfileRepository::new(service.clone()).create(&row).await {
            Ok(identity) => self
                .shared
                .commit(epoch, Session::authenticated(identity.clone()), Some(&remote.access_token))
                .map(|_| identity),
            Err(e) => {
                warn!("Profile creation failed for new user {}: {}", remote.user_id(), e);
                Err(e)
            }
        };

        match created {
            Ok(identity) => {
                info!("Signed up user {} as {}", identity.id, identity.role);
                Ok(identity)
            }
            Err(e) => {
                self.abandon_remote_session(epoch, &service, &remote).await;
                Err(e)
            }
        }
    }

    /// Always ends anonymous with the cache cleared; remote failures are only logged.
    pub async fn sign_out(&self) -> Session {
        let session = self.shared.sign_out_locally();
        info!("Signed out locally");

        if let Ok(service) = self.shared.backend.service() {
            if let Err(e) = service.sign_out().await {
                warn!("Remote sign-out failed; local session already cleared: {}", e);
            }
        }
        session
    }

    /// Change display name, organization or avatar. The local identity only
    /// changes after the remote write is confirmed.
    pub async fn update_profile(&self, update: ProfileUpdate) -> ServiceResult<Identity> {
        update.validate()?;
        let service = self.shared.backend.service()?.clone();
        let current = self.session().identity().cloned().ok_or(ServiceError::NotAuthenticated)?;
        if update.is_empty_update() {
            return Ok(current);
        }

        let operation = self.shared.begin_operation(&service);
        let epoch = operation.epoch;
        let stored = ProfileRepository::new(service).update(current.id, &update).await.map_err(|e| {
            warn!("Profile update for {} failed: {}", current.id, e);
            e
        })?;

        let merged = Identity {
            display_name: stored.display_name,
            organization: stored.organization,
            avatar_ref: stored.avatar_ref,
            ..current
        };
        self.shared
            .commit_for_user(epoch, merged.id, Session::authenticated(merged.clone()))?;
        debug!("Profile of {} updated", merged.id);
        Ok(merged)
    }

    /// Role-set query: false unless authenticated, admin always passes
    pub fn has_permission(&self, required: &[UserRole]) -> bool {
        self.shared.state.borrow().has_permission(required)
    }

    pub fn has_feature(&self, permission: Permission) -> bool {
        self.shared.state.borrow().has_feature(permission)
    }

    pub fn session(&self) -> Session {
        self.shared.state.borrow().clone()
    }

    /// Receiver that sees every committed session change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.state.subscribe()
    }

    pub fn auth_context(&self) -> Option<AuthContext> {
        AuthContext::from_session(&self.shared.state.borrow())
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.current()
    }

    pub fn reconcile_stats(&self) -> ReconcileStats {
        *self.shared.stats.borrow()
    }

    /// Wait until the listener has handled at least `count` notifications
    pub async fn wait_for_reconciled(&self, count: u64) -> ReconcileStats {
        let mut rx = self.shared.stats.subscribe();
        let stats = match rx.wait_for(|s| s.handled() >= count).await {
            Ok(stats) => *stats,
            Err(_) => self.reconcile_stats(),
        };
        stats
    }

    /// Stop the change listener and release its subscription
    pub async fn shutdown(&self) {
        let guard = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(guard) = guard {
            guard.stop().await;
            info!("Session controller shut down");
        }
    }
}
