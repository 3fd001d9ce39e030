use serde::{Deserialize, Serialize};

// --- User Role Definition ---

/// UserRole enum for authorization in the portal
///
/// Wire names match the `role` column of the hosted `profiles` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Volunteer,
    Donor,
    /// Refugee / aid beneficiary. Stored as `"user"`.
    #[default]
    #[serde(rename = "user")]
    Beneficiary,
}

// --- Permission Enum Definition ---

/// Feature-level permissions gating the role-aware portals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    // Admin portal
    AccessAdminPortal,
    ManageUsers,
    VerifyOrganizations,
    ViewAllAidRequests,

    // Donor portal
    AccessDonorPortal,
    CreateCampaign,
    ViewDonationHistory,
    ViewDonorImpact,

    // Volunteer portal
    AccessVolunteerPortal,
    TriageAidRequests,

    // Refugee portal (every signed-in role)
    AccessRefugeePortal,
    SubmitAidRequest,
    SubmitNeedsAssessment,
    ViewResourceMatches,
    UploadDocuments,
    ViewEmergencyInfo,
}

// --- UserRole Implementation ---

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Volunteer => "volunteer",
            UserRole::Donor => "donor",
            UserRole::Beneficiary => "user",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(UserRole::Admin),
            "volunteer" => Some(UserRole::Volunteer),
            "donor" => Some(UserRole::Donor),
            "user" => Some(UserRole::Beneficiary),
            _ => None,
        }
    }

    pub fn all() -> [UserRole; 4] {
        [UserRole::Admin, UserRole::Volunteer, UserRole::Donor, UserRole::Beneficiary]
    }

    /// Role-set check used by navigation guards.
    ///
    /// Admin satisfies every requirement, including an empty one.
    pub fn satisfies(&self, required: &[UserRole]) -> bool {
        matches!(self, UserRole::Admin) || required.contains(self)
    }

    /// Check if the role grants a specific feature permission
    pub fn has_permission(&self, permission: Permission) -> bool {
        match self {
            UserRole::Admin => true, // Admin has all permissions
            UserRole::Donor => match permission {
                Permission::AccessDonorPortal
                | Permission::CreateCampaign
                | Permission::ViewDonationHistory
                | Permission::ViewDonorImpact => true,

                Permission::AccessVolunteerPortal | Permission::TriageAidRequests => false,

                _ => Self::is_common(permission),
            },
            UserRole::Volunteer => match permission {
                Permission::AccessVolunteerPortal | Permission::TriageAidRequests => true,

                Permission::AccessDonorPortal
                | Permission::CreateCampaign
                | Permission::ViewDonationHistory
                | Permission::ViewDonorImpact => false,

                _ => Self::is_common(permission),
            },
            UserRole::Beneficiary => Self::is_common(permission),
        }
    }

    /// Check if the role has all of the specified permissions
    pub fn has_permissions(&self, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(*p))
    }

    // Refugee-portal features available to every signed-in role
    fn is_common(permission: Permission) -> bool {
        matches!(
            permission,
            Permission::AccessRefugeePortal
                | Permission::SubmitAidRequest
                | Permission::SubmitNeedsAssessment
                | Permission::ViewResourceMatches
                | Permission::UploadDocuments
                | Permission::ViewEmergencyInfo
        )
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Permission Implementation (String Conversions & Listing) ---

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::AccessAdminPortal => "access_admin_portal",
            Permission::ManageUsers => "manage_users",
            Permission::VerifyOrganizations => "verify_organizations",
            Permission::ViewAllAidRequests => "view_all_aid_requests",
            Permission::AccessDonorPortal => "access_donor_portal",
            Permission::CreateCampaign => "create_campaign",
            Permission::ViewDonationHistory => "view_donation_history",
            Permission::ViewDonorImpact => "view_donor_impact",
            Permission::AccessVolunteerPortal => "access_volunteer_portal",
            Permission::TriageAidRequests => "triage_aid_requests",
            Permission::AccessRefugeePortal => "access_refugee_portal",
            Permission::SubmitAidRequest => "submit_aid_request",
            Permission::SubmitNeedsAssessment => "submit_needs_assessment",
            Permission::ViewResourceMatches => "view_resource_matches",
            Permission::UploadDocuments => "upload_documents",
            Permission::ViewEmergencyInfo => "view_emergency_info",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|p| p.as_str() == s)
    }

    /// Get all permissions in the system
    pub fn all() -> Vec<Permission> {
        vec![
            // Admin portal
            Permission::AccessAdminPortal, Permission::ManageUsers,
            Permission::VerifyOrganizations, Permission::ViewAllAidRequests,
            // Donor portal
            Permission::AccessDonorPortal, Permission::CreateCampaign,
            Permission::ViewDonationHistory, Permission::ViewDonorImpact,
            // Volunteer portal
            Permission::AccessVolunteerPortal, Permission::TriageAidRequests,
            // Refugee portal
            Permission::AccessRefugeePortal, Permission::SubmitAidRequest,
            Permission::SubmitNeedsAssessment, Permission::ViewResourceMatches,
            Permission::UploadDocuments, Permission::ViewEmergencyInfo,
        ]
    }
}
