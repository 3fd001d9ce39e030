use crate::domains::profile::types::{Identity, ProfileRow, ProfileUpdate};
use crate::errors::{IdentityError, ServiceError, ServiceResult};
use crate::identity::IdentityService;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Profile access on top of the identity service's row store.
///
/// Rows come back in wire form and are converted to [`Identity`] here, so the
/// session controller never handles raw rows.
#[derive(Clone)]
pub struct ProfileRepository {
    service: Arc<dyn IdentityService>,
}

impl ProfileRepository {
    pub fn new(service: Arc<dyn IdentityService>) -> Self {
        Self { service }
    }

    /// Find the identity for a user id. `Ok(None)` when no profile row exists.
    pub async fn find_identity(&self, user_id: Uuid) -> ServiceResult<Option<Identity>> {
        debug!("Fetching profile {}", user_id);
        match self.service.select_profile(user_id).await? {
            Some(row) => Ok(Some(row.into_identity()?)),
            None => Ok(None),
        }
    }

    /// Insert the profile row created during sign-up
    pub async fn create(&self, row: &ProfileRow) -> ServiceResult<Identity> {
        debug!("Creating profile {} with role {}", row.id, row.role);
        let stored = self.service.insert_profile(row).await?;
        Ok(stored.into_identity()?)
    }

    /// Apply a self-service update and return the identity as stored remotely
    pub async fn update(&self, user_id: Uuid, update: &ProfileUpdate) -> ServiceResult<Identity> {
        let patch = update.to_patch();
        let stored = self
            .service
            .update_profile(user_id, &patch)
            .await
            .map_err(|e| match e {
                IdentityError::NotFound(_) => ServiceError::ProfileNotFound(user_id.to_string()),
                other => other.into(),
            })?;
        Ok(stored.into_identity()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::testing::ScriptedIdentityService;
    use crate::types::UserRole;

    #[tokio::test]
    async fn missing_profile_is_none_not_error() {
        let service = Arc::new(ScriptedIdentityService::new());
        let repo = ProfileRepository::new(service);
        assert_eq!(repo.find_identity(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn update_returns_server_row() {
        let service = Arc::new(ScriptedIdentityService::new());
        let user = service.add_account("donor@example.org", "secret1", "Dana", UserRole::Donor);
        let repo = ProfileRepository::new(service.clone());

        let update = ProfileUpdate {
            organization: Some("Acme".to_string()),
            ..Default::default()
        };
        let identity = repo.update(user, &update).await.unwrap();
        assert_eq!(identity.organization.as_deref(), Some("Acme"));
        assert_eq!(identity.display_name, "Dana");
        assert_eq!(identity.role, UserRole::Donor);
    }

    #[tokio::test]
    async fn update_of_unknown_profile_maps_to_profile_not_found() {
        let service = Arc::new(ScriptedIdentityService::new());
        let repo = ProfileRepository::new(service);
        let result = repo.update(Uuid::new_v4(), &ProfileUpdate::default()).await;
        assert!(matches!(result, Err(ServiceError::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn network_failure_propagates_as_network_error() {
        let service = Arc::new(ScriptedIdentityService::new());
        let user = service.add_account("v@example.org", "secret1", "Vol", UserRole::Volunteer);
        service.fail_profile_reads(true);
        let repo = ProfileRepository::new(service);
        assert!(matches!(repo.find_identity(user).await, Err(ServiceError::Network(_))));
    }
}
