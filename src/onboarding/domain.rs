use serde::{Deserialize, Serialize};

/// Coarse lifecycle status exposed to callers. Derived from the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    New,
    InProgress,
    Completed,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStage {
    New,
    EmailIssued,
    ProvisioningAccess,
    Completed,
}

impl OnboardingStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::EmailIssued => "email_issued",
            Self::ProvisioningAccess => "provisioning_access",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "new" => Some(Self::New),
            "email_issued" => Some(Self::EmailIssued),
            "provisioning_access" => Some(Self::ProvisioningAccess),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Stages only move forward one at a time.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::New, Self::EmailIssued)
                | (Self::EmailIssued, Self::ProvisioningAccess)
                | (Self::ProvisioningAccess, Self::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }

    pub fn status(self) -> UserStatus {
        match self {
            Self::New => UserStatus::New,
            Self::EmailIssued | Self::ProvisioningAccess => UserStatus::InProgress,
            Self::Completed => UserStatus::Completed,
        }
    }
}

impl std::fmt::Display for OnboardingStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessItemStatus {
    Pending,
    Completed,
}

impl AccessItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessItem {
    pub service: String,
    pub status: AccessItemStatus,
    pub completed_at: Option<i64>,
}

impl AccessItem {
    pub fn is_completed(&self) -> bool {
        self.status == AccessItemStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub message: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntity {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub company_email: Option<String>,
    pub contact_no: Option<String>,
    pub location: Option<String>,
    pub date_of_joining: Option<String>,
    pub level: Option<String>,
    pub role: Option<String>,
    pub team: String,
    pub manager: Option<String>,
    pub status: UserStatus,
    pub stage: OnboardingStage,
    pub access_items: Vec<AccessItem>,
    pub activity: Vec<ActivityEntry>,
    pub created_at: i64,
}

impl UserEntity {
    pub fn access_item(&self, service: &str) -> Option<&AccessItem> {
        self.access_items
            .iter()
            .find(|item| item.service.eq_ignore_ascii_case(service))
    }

    pub fn pending_items(&self) -> impl Iterator<Item = &AccessItem> {
        self.access_items.iter().filter(|item| !item.is_completed())
    }

    pub fn all_items_completed(&self) -> bool {
        self.access_items.iter().all(AccessItem::is_completed)
    }
}

/// Fields supplied by whoever requests onboarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub team: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub contact_no: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub date_of_joining: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub manager: Option<String>,
}

impl NewUser {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        team: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            team: team.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must be non-empty".to_string());
        }
        if self.team.trim().is_empty() {
            return Err("team must be non-empty".to_string());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
            _ => return Err(format!("`{email}` is not an email address")),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PocRoutingRule {
    pub role: String,
    pub team: String,
    pub access_item: String,
    pub poc_id: String,
}

/// One manual status change requested for an access item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessItemUpdate {
    pub service: String,
    pub status: AccessItemStatus,
}

/// Access items that are satisfied by issuing the company identity itself.
pub fn is_identity_item(service: &str) -> bool {
    matches!(
        service.trim().to_ascii_lowercase().as_str(),
        "email" | "sso" | "email/sso" | "email_sso" | "entra" | "company_email"
    )
}
