use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local database errors (offline document store)
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DbError", 2)?;
        match self {
            DbError::Sqlx(err) => {
                state.serialize_field("type", "Sqlx")?;
                state.serialize_field("message", &err.to_string())?;
            }
            DbError::Migration(s) => {
                state.serialize_field("type", "Migration")?;
                state.serialize_field("message", s)?;
            }
            DbError::Other(s) => {
                state.serialize_field("type", "Other")?;
                state.serialize_field("message", s)?;
            }
        }
        state.end()
    }
}

/// Manual Clone implementation for DbError
impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Sqlx(err) => DbError::Other(format!("SQLx error: {}", err)),
            DbError::Migration(s) => DbError::Migration(s.clone()),
            DbError::Other(s) => DbError::Other(s.clone()),
        }
    }
}

/// Errors reported by the remote identity service.
///
/// These stay inside the session controller; callers only ever see the
/// [`ServiceError`] they are converted into.
#[derive(Debug, Error, Clone, Serialize)]
pub enum IdentityError {
    #[error("Invalid login credentials: {0}")]
    InvalidCredentials(String),

    #[error("Account already registered: {0}")]
    DuplicateAccount(String),

    #[error("Account created but awaiting email confirmation: {0}")]
    ConfirmationRequired(String),

    #[error("Row not found: {0}")]
    NotFound(String),

    #[error("Session rejected by identity service: {0}")]
    SessionRejected(String),

    #[error("Identity service unreachable: {0}")]
    Transport(String),

    #[error("Identity service returned {status}: {message}")]
    Remote {
        status: u16,
        message: String,
    },

    #[error("Failed to decode identity service response: {0}")]
    Decode(String),

    #[error("Identity service is not configured")]
    Unconfigured,
}

impl From<reqwest::Error> for IdentityError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            IdentityError::Decode(error.to_string())
        } else {
            IdentityError::Transport(error.to_string())
        }
    }
}

/// Domain-level errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for DomainError {
    fn from(error: serde_json::Error) -> Self {
        DomainError::Serialization(error.to_string())
    }
}

/// How the presentation layer should treat a failed operation.
///
/// There is no fatal class: identity failures degrade the application to a
/// logged-out or read-only state, they never take it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Shown as a dismissable message; the session is unchanged.
    RecoverableUserFacing,
    /// Identity service unreachable or misconfigured; degrade to anonymous.
    RecoverableNetwork,
    /// Logged only.
    NonFatalWarning,
}

/// Service-level errors (application specific)
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("An account with this email already exists: {0}")]
    DuplicateAccount(String),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation already in progress: {0}")]
    OperationInProgress(String),

    #[error("Profile not found for user {0}")]
    ProfileNotFound(String),

    #[error("Session expired")]
    SessionExpired,

    #[error("Operation superseded by a newer session change")]
    Superseded,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Request rejected by identity service: {0}")]
    Rejected(String),
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::Domain(DomainError::Validation(_))
            | ServiceError::Domain(DomainError::InvalidRole(_))
            | ServiceError::Authentication(_)
            | ServiceError::DuplicateAccount(_)
            | ServiceError::NotAuthenticated
            | ServiceError::PermissionDenied(_)
            | ServiceError::OperationInProgress(_)
            | ServiceError::SessionExpired
            | ServiceError::Rejected(_) => ErrorClass::RecoverableUserFacing,

            ServiceError::Network(_)
            | ServiceError::Configuration(_)
            | ServiceError::ExternalService(_) => ErrorClass::RecoverableNetwork,

            ServiceError::Domain(_)
            | ServiceError::ProfileNotFound(_)
            | ServiceError::Superseded => ErrorClass::NonFatalWarning,
        }
    }

    /// Message suitable for a dismissable banner. Never includes transport details.
    pub fn user_message(&self) -> String {
        if let ServiceError::Rejected(_) = self {
            // The backend's own wording stays in the logs
            return "The service refused this request. Please try again or contact support.".to_string();
        }
        match self.class() {
            ErrorClass::RecoverableUserFacing => self.to_string(),
            ErrorClass::RecoverableNetwork => {
                "The service is unavailable right now. You can keep using the app while signed out.".to_string()
            }
            ErrorClass::NonFatalWarning => "Something went wrong, please try again.".to_string(),
        }
    }
}

impl From<IdentityError> for ServiceError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::InvalidCredentials(msg) => ServiceError::Authentication(msg),
            IdentityError::DuplicateAccount(msg) => ServiceError::DuplicateAccount(msg),
            IdentityError::ConfirmationRequired(email) => ServiceError::Authentication(format!(
                "Check the inbox of {} to confirm the account before signing in",
                email
            )),
            IdentityError::NotFound(what) => ServiceError::ProfileNotFound(what),
            IdentityError::SessionRejected(_) => ServiceError::SessionExpired,
            IdentityError::Transport(msg) => ServiceError::Network(msg),
            IdentityError::Remote { status, message } if status >= 500 => {
                ServiceError::ExternalService(format!("{}: {}", status, message))
            }
            IdentityError::Remote { status, message } => ServiceError::Rejected(format!("{}: {}", status, message)),
            IdentityError::Decode(msg) => ServiceError::ExternalService(msg),
            IdentityError::Unconfigured => {
                ServiceError::Configuration("identity service is not configured".to_string())
            }
        }
    }
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' must be at least {min} characters")]
    MinLength {
        field: String,
        min: usize,
    },

    #[error("Field '{field}' cannot exceed {max} characters")]
    MaxLength {
        field: String,
        max: usize,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn min_length(field: &str, min: usize) -> Self {
        Self::MinLength {
            field: field.to_string(),
            min,
        }
    }

    pub fn max_length(field: &str, max: usize) -> Self {
        Self::MaxLength {
            field: field.to_string(),
            max,
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}
