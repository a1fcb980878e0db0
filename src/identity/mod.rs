//! Company identity issuance. An issuer turns a person's name into a
//! directory account and reports the address it settled on.

pub mod entra;
pub mod naming;

pub use entra::{EntraConfig, EntraIdentityIssuer};

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequest {
    pub firstname: String,
    pub lastname: String,
    pub full_name: Option<String>,
}

impl IdentityRequest {
    pub fn new(firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        Self {
            firstname: firstname.into(),
            lastname: lastname.into(),
            full_name: None,
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = Some(full_name.into());
        self
    }

    /// Splits a display name into first and last parts. Single-word names are
    /// rejected because the address needs both.
    pub fn from_display_name(name: &str) -> Result<Self, IdentityError> {
        let (first, last) = naming::split_full_name(name)
            .ok_or_else(|| IdentityError::InvalidName(name.trim().to_string()))?;
        Ok(Self::new(first, last).with_full_name(name.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedIdentity {
    pub email: String,
    pub principal_name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("name `{0}` needs both a first and a last part")]
    InvalidName(String),
    #[error("identity provider is not configured: {0}")]
    NotConfigured(String),
    #[error("identity token request failed: {0}")]
    Token(String),
    #[error("identity provider rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("identity provider is unreachable: {0}")]
    Transport(String),
    #[error("password generation failed: {0}")]
    Random(String),
}

pub trait IdentityIssuer: Send + Sync {
    fn issue(&self, request: &IdentityRequest) -> Result<IssuedIdentity, IdentityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_need_two_parts() {
        let request = IdentityRequest::from_display_name("  Jane   van Doe ").expect("split");
        assert_eq!(request.firstname, "Jane");
        assert_eq!(request.lastname, "van Doe");
        assert_eq!(request.full_name.as_deref(), Some("Jane   van Doe"));

        let err = IdentityRequest::from_display_name("Cher").expect_err("single word");
        assert!(matches!(err, IdentityError::InvalidName(name) if name == "Cher"));
    }
}
