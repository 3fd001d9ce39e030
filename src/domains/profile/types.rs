use crate::errors::{DomainError, DomainResult};
use crate::validation::{Validate, ValidationBuilder};
use crate::types::UserRole;
use uuid::Uuid;
use chrono::Utc;
use serde::{Serialize, Deserialize};

/// The authenticated user's profile as the rest of the application sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: UserRole,
    pub organization: Option<String>,
    pub verified: bool,
    pub avatar_ref: Option<String>,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }
}

/// Credentials DTO - used for sign-in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(email: &str, secret: &str) -> Self {
        Self {
            email: email.trim().to_string(),
            secret: secret.to_string(),
        }
    }
}

impl Validate for Credentials {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("email", Some(self.email.clone()))
            .required()
            .email()
            .validate()?;

        ValidationBuilder::new("password", Some(self.secret.clone()))
            .required()
            .validate()?;

        Ok(())
    }
}

/// NewAccount DTO - used for sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub secret: String,
    pub display_name: String,
    /// Requested role; `None` means the default beneficiary role.
    pub role: Option<UserRole>,
    pub organization: Option<String>,
}

impl NewAccount {
    pub fn requested_role(&self) -> UserRole {
        self.role.unwrap_or_default()
    }

    /// Profile row to insert once the identity exists.
    ///
    /// Only admin accounts start out verified.
    pub fn profile_row(&self, user_id: Uuid, email: &str) -> ProfileRow {
        let role = self.requested_role();
        ProfileRow {
            id: user_id.to_string(),
            email: email.to_string(),
            full_name: Some(self.display_name.trim().to_string()),
            role: role.as_str().to_string(),
            organization: self
                .organization
                .as_ref()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty()),
            verified: role == UserRole::Admin,
            avatar_url: None,
            created_at: Some(Utc::now().to_rfc3339()),
            updated_at: Some(Utc::now().to_rfc3339()),
        }
    }
}

impl Validate for NewAccount {
    fn validate(&self) -> DomainResult<()> {
        ValidationBuilder::new("email", Some(self.email.clone()))
            .required()
            .email()
            .validate()?;

        // Hosted auth rejects passwords shorter than six characters
        ValidationBuilder::new("password", Some(self.secret.clone()))
            .required()
            .min_length(6)
            .validate()?;

        ValidationBuilder::new("name", Some(self.display_name.clone()))
            .required()
            .not_blank()
            .max_length(100)
            .validate()?;

        ValidationBuilder::new("organization", self.organization.clone())
            .max_length(150)
            .validate()?;

        Ok(())
    }
}

/// ProfileUpdate DTO - the only identity fields a user may change themselves.
///
/// Role and verification are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub organization: Option<String>,
    pub avatar_ref: Option<String>,
}

impl ProfileUpdate {
    /// Check whether the update payload carries any field changes.
    pub fn is_empty_update(&self) -> bool {
        self.display_name.is_none() && self.organization.is_none() && self.avatar_ref.is_none()
    }

    pub fn to_patch(&self) -> ProfilePatch {
        ProfilePatch {
            full_name: self.display_name.as_ref().map(|n| n.trim().to_string()),
            organization: self.organization.clone(),
            avatar_url: self.avatar_ref.clone(),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.display_name {
            ValidationBuilder::new("name", Some(name.clone()))
                .not_blank()
                .max_length(100)
                .validate()?;
        }

        ValidationBuilder::new("organization", self.organization.clone())
            .max_length(150)
            .validate()?;

        ValidationBuilder::new("avatar", self.avatar_ref.clone())
            .max_length(2048)
            .validate()?;

        Ok(())
    }
}

/// Row of the hosted `profiles` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: String,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ProfileRow {
    /// Convert a remote row to the identity entity
    pub fn into_identity(self) -> DomainResult<Identity> {
        let id = Uuid::parse_str(&self.id).map_err(|_| DomainError::InvalidUuid(self.id.clone()))?;
        let role = UserRole::from_str(&self.role).ok_or_else(|| DomainError::InvalidRole(self.role.clone()))?;

        // Profiles created without a name fall back to the email address
        let display_name = self
            .full_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.clone());

        Ok(Identity {
            id,
            display_name,
            email: self.email,
            role,
            organization: self.organization,
            verified: self.verified,
            avatar_ref: self.avatar_url,
        })
    }
}

/// Partial update body for the `profiles` table; absent fields are left untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;

    fn row(role: &str) -> ProfileRow {
        ProfileRow {
            id: "9b2f6c1e-8d4a-4f7e-a1b2-3c4d5e6f7a8b".to_string(),
            email: "amina@example.org".to_string(),
            full_name: Some("Amina Yusuf".to_string()),
            role: role.to_string(),
            organization: Some("Relief Works".to_string()),
            verified: false,
            avatar_url: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn row_converts_to_identity() {
        let identity = row("donor").into_identity().unwrap();
        assert_eq!(identity.display_name, "Amina Yusuf");
        assert_eq!(identity.role, UserRole::Donor);
        assert_eq!(identity.organization.as_deref(), Some("Relief Works"));
        assert!(!identity.is_admin());
    }

    #[test]
    fn missing_name_falls_back_to_email() {
        let mut r = row("user");
        r.full_name = None;
        assert_eq!(r.into_identity().unwrap().display_name, "amina@example.org");
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(matches!(row("superuser").into_identity(), Err(DomainError::InvalidRole(_))));
        let mut r = row("user");
        r.id = "7".to_string();
        assert!(matches!(r.into_identity(), Err(DomainError::InvalidUuid(_))));
    }

    #[test]
    fn row_deserializes_with_sparse_columns() {
        let json = r#"{"id":"9b2f6c1e-8d4a-4f7e-a1b2-3c4d5e6f7a8b","email":"a@example.org","role":"volunteer"}"#;
        let parsed: ProfileRow = serde_json::from_str(json).unwrap();
        assert!(!parsed.verified);
        assert_eq!(parsed.full_name, None);
    }

    #[test]
    fn only_admin_sign_ups_start_verified() {
        let mut account = NewAccount {
            email: "lead@example.org".to_string(),
            secret: "s3cret!".to_string(),
            display_name: " Lead ".to_string(),
            role: Some(UserRole::Admin),
            organization: Some("  ".to_string()),
        };
        let id = Uuid::new_v4();
        let admin_row = account.profile_row(id, "lead@example.org");
        assert!(admin_row.verified);
        assert_eq!(admin_row.full_name.as_deref(), Some("Lead"));
        assert_eq!(admin_row.organization, None);

        account.role = None;
        let default_row = account.profile_row(id, "lead@example.org");
        assert_eq!(default_row.role, "user");
        assert!(!default_row.verified);
    }

    #[test]
    fn credentials_require_email_and_secret() {
        assert!(Credentials::new("user@example.org", "pw").validate().is_ok());
        assert!(matches!(
            Credentials::new("", "pw").validate(),
            Err(DomainError::Validation(ValidationError::Required { .. }))
        ));
        assert!(Credentials::new("user@example.org", "").validate().is_err());
        assert!(Credentials::new("not-an-email", "pw").validate().is_err());
    }

    #[test]
    fn sign_up_enforces_secret_length_and_name() {
        let account = NewAccount {
            email: "new@example.org".to_string(),
            secret: "12345".to_string(),
            display_name: "New".to_string(),
            role: None,
            organization: None,
        };
        assert!(account.validate().is_err());

        let account = NewAccount { secret: "123456".to_string(), display_name: "  ".to_string(), ..account };
        assert!(account.validate().is_err());
    }

    #[test]
    fn patch_only_serializes_changed_fields() {
        let update = ProfileUpdate {
            organization: Some("Acme".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty_update());
        let json = serde_json::to_value(update.to_patch()).unwrap();
        assert_eq!(json["organization"], "Acme");
        assert!(json.get("full_name").is_none());
        assert!(json.get("role").is_none());
        assert!(json.get("updated_at").is_some());
        assert!(ProfileUpdate::default().is_empty_update());
    }
}
