//! Wire format of the order verification check.
//!
//! The expected password is derived and compared server-side only; neither
//! type here ever carries it.

use serde::{Deserialize, Serialize};

use super::SubjectId;

/// Candidate password submitted for a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    #[serde(default)]
    pub password: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<SubjectId>,
}

/// Outcome of a verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerificationResponse {
    /// A passed check carrying a fresh opaque token.
    #[must_use]
    pub fn passed(token: String) -> Self {
        Self {
            success: true,
            verification_token: Some(token),
            error: None,
            message: Some("Verification successful".to_owned()),
        }
    }

    /// A failed check with a user-facing reason.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            verification_token: None,
            error: Some(error.into()),
            message: None,
        }
    }
}
