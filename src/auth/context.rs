use uuid::Uuid;
use crate::auth::session::Session;
use crate::types::{UserRole, Permission};
use crate::errors::ServiceError;

/// Authorization view of an authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// The ID of the authenticated user
    pub user_id: Uuid,

    /// The role of the authenticated user
    pub role: UserRole,

    /// Whether an administrator has verified the user's organization
    pub verified: bool,
}

impl AuthContext {
    pub fn new(user_id: Uuid, role: UserRole, verified: bool) -> Self {
        Self {
            user_id,
            role,
            verified,
        }
    }

    /// Context for an authenticated session; `None` for every other state
    pub fn from_session(session: &Session) -> Option<Self> {
        if !session.is_logged_in() {
            return None;
        }
        session
            .identity()
            .map(|identity| Self::new(identity.id, identity.role, identity.verified))
    }

    /// Check if user has a specific permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// Role-set check; admin always passes
    pub fn has_any_role(&self, required: &[UserRole]) -> bool {
        self.role.satisfies(required)
    }

    /// Authorize a specific permission, returning an error if not allowed
    pub fn authorize(&self, permission: Permission) -> Result<(), ServiceError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "User does not have permission: {}",
                permission.as_str()
            )))
        }
    }

    /// Authorize multiple permissions, requiring all of them
    pub fn authorize_all(&self, permissions: &[Permission]) -> Result<(), ServiceError> {
        if self.role.has_permissions(permissions) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(
                "User does not have all required permissions".to_string()
            ))
        }
    }

    /// Authorize access to a role-gated area
    pub fn authorize_roles(&self, required: &[UserRole]) -> Result<(), ServiceError> {
        if self.has_any_role(required) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "This area is restricted to: {}",
                required.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
            )))
        }
    }

    /// Verify user is an admin
    pub fn authorize_admin(&self) -> Result<(), ServiceError> {
        if matches!(self.role, UserRole::Admin) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(
                "This action requires administrator privileges".to_string()
            ))
        }
    }

    /// For operations restricted to the user's own records
    pub fn authorize_self_or_admin(&self, resource_owner_id: &Uuid) -> Result<(), ServiceError> {
        if &self.user_id == resource_owner_id || matches!(self.role, UserRole::Admin) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(
                "You do not have permission to access this resource".to_string()
            ))
        }
    }

    /// Organization-backed actions need an admin-verified account
    pub fn authorize_verified(&self) -> Result<(), ServiceError> {
        if self.verified || matches!(self.role, UserRole::Admin) {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(
                "Your organization has not been verified yet".to_string()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::identity_with_role;

    #[test]
    fn only_authenticated_sessions_yield_a_context() {
        assert!(AuthContext::from_session(&Session::anonymous()).is_none());
        assert!(AuthContext::from_session(&Session::bootstrapping(Some(identity_with_role(UserRole::Admin)))).is_none());

        let identity = identity_with_role(UserRole::Donor);
        let ctx = AuthContext::from_session(&Session::authenticated(identity.clone())).unwrap();
        assert_eq!(ctx.user_id, identity.id);
        assert_eq!(ctx.role, UserRole::Donor);
    }

    #[test]
    fn admin_passes_every_check() {
        let ctx = AuthContext::new(Uuid::new_v4(), UserRole::Admin, false);
        assert!(ctx.authorize(Permission::VerifyOrganizations).is_ok());
        assert!(ctx.authorize_roles(&[UserRole::Donor]).is_ok());
        assert!(ctx.authorize_admin().is_ok());
        assert!(ctx.authorize_self_or_admin(&Uuid::new_v4()).is_ok());
        assert!(ctx.authorize_verified().is_ok());
    }

    #[test]
    fn donor_is_limited_to_own_area() {
        let me = Uuid::new_v4();
        let ctx = AuthContext::new(me, UserRole::Donor, false);
        assert!(ctx.authorize(Permission::CreateCampaign).is_ok());
        assert!(ctx.authorize_all(&[Permission::AccessDonorPortal, Permission::ViewDonorImpact]).is_ok());
        assert!(matches!(ctx.authorize_admin(), Err(ServiceError::PermissionDenied(_))));
        assert!(ctx.authorize_roles(&[UserRole::Volunteer]).is_err());
        assert!(ctx.authorize_self_or_admin(&me).is_ok());
        assert!(ctx.authorize_self_or_admin(&Uuid::new_v4()).is_err());
        assert!(ctx.authorize_verified().is_err());
    }
}
