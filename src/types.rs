use serde::{Deserialize, Serialize};

// Re-export UserRole and Permission from the permission module
pub use crate::domains::permission::{UserRole, Permission};

/// Session change event kinds emitted by the identity service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl AuthChangeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthChangeEvent::InitialSession => "INITIAL_SESSION",
            AuthChangeEvent::SignedIn => "SIGNED_IN",
            AuthChangeEvent::SignedOut => "SIGNED_OUT",
            AuthChangeEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthChangeEvent::UserUpdated => "USER_UPDATED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INITIAL_SESSION" => Some(AuthChangeEvent::InitialSession),
            "SIGNED_IN" => Some(AuthChangeEvent::SignedIn),
            "SIGNED_OUT" => Some(AuthChangeEvent::SignedOut),
            "TOKEN_REFRESHED" => Some(AuthChangeEvent::TokenRefreshed),
            "USER_UPDATED" => Some(AuthChangeEvent::UserUpdated),
            _ => None,
        }
    }
}

/// In-flight local operation, exposed so the UI can disable duplicate submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingOperation {
    SigningIn,
    SigningUp,
}

impl PendingOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingOperation::SigningIn => "signing_in",
            PendingOperation::SigningUp => "signing_up",
        }
    }
}
