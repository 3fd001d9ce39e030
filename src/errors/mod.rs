mod error;

pub use error::{DbError, DomainError, ErrorClass, IdentityError, ServiceError, ValidationError};

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for identity service calls
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
