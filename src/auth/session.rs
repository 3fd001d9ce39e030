use crate::domains::profile::Identity;
use crate::types::{Permission, PendingOperation, UserRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Bootstrapping,
    Anonymous,
    Authenticated,
    /// The identity service could not be reached while reconciling a remote
    /// session. Behaves as anonymous until the next successful reconciliation.
    TransientError,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Bootstrapping => "bootstrapping",
            SessionStatus::Anonymous => "anonymous",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::TransientError => "transient_error",
        }
    }
}

/// Read model of the current authentication state.
///
/// Fields are private: the constructors are the only way to pick a status,
/// and only [`Session::authenticated`] attaches an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    identity: Option<Identity>,
    status: SessionStatus,
    pending: Option<PendingOperation>,
    last_known: Option<Identity>,
    warning: Option<String>,
}

impl Session {
    /// Startup state, optionally showing the identity remembered from the last run
    pub fn bootstrapping(last_known: Option<Identity>) -> Self {
        Self {
            identity: None,
            status: SessionStatus::Bootstrapping,
            pending: None,
            last_known,
            warning: None,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            identity: None,
            status: SessionStatus::Anonymous,
            pending: None,
            last_known: None,
            warning: None,
        }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            status: SessionStatus::Authenticated,
            pending: None,
            last_known: None,
            warning: None,
        }
    }

    pub fn transient_error(message: impl Into<String>) -> Self {
        Self {
            identity: None,
            status: SessionStatus::TransientError,
            pending: None,
            last_known: None,
            warning: Some(message.into()),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub(crate) fn with_pending(mut self, pending: Option<PendingOperation>) -> Self {
        self.pending = pending;
        self
    }

    pub(crate) fn set_pending(&mut self, pending: Option<PendingOperation>) {
        self.pending = pending;
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn pending(&self) -> Option<PendingOperation> {
        self.pending
    }

    pub fn last_known(&self) -> Option<&Identity> {
        self.last_known.as_ref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn role(&self) -> Option<UserRole> {
        self.identity.as_ref().map(|i| i.role)
    }

    pub fn is_logged_in(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(UserRole::Admin)
    }

    pub fn is_donor(&self) -> bool {
        self.role() == Some(UserRole::Donor)
    }

    pub fn is_volunteer(&self) -> bool {
        self.role() == Some(UserRole::Volunteer)
    }

    /// Role-set permission query.
    ///
    /// False unless authenticated; admin passes any requirement.
    pub fn has_permission(&self, required: &[UserRole]) -> bool {
        match (&self.status, &self.identity) {
            (SessionStatus::Authenticated, Some(identity)) => identity.role.satisfies(required),
            _ => false,
        }
    }

    /// Feature-level permission query, same authentication rule as [`Session::has_permission`]
    pub fn has_feature(&self, permission: Permission) -> bool {
        match (&self.status, &self.identity) {
            (SessionStatus::Authenticated, Some(identity)) => identity.role.has_permission(permission),
            _ => false,
        }
    }
}

/// Snapshot persisted by the local session cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub identity: Identity,
    pub saved_at: DateTime<Utc>,
}

impl CachedSession {
    pub fn of(session: &Session) -> Option<Self> {
        session.identity().map(|identity| Self {
            identity: identity.clone(),
            saved_at: Utc::now(),
        })
    }
}

#[cfg(test)]
pub(crate) fn identity_with_role(role: UserRole) -> Identity {
    Identity {
        id: uuid::Uuid::new_v4(),
        display_name: "Test User".to_string(),
        email: "test@example.org".to_string(),
        role,
        organization: None,
        verified: role == UserRole::Admin,
        avatar_ref: None,
    }
}
