//! Application-level user profile rows.

use serde::{Deserialize, Serialize};

use super::{Email, HallTicket, ProfileId, SubjectId};

/// A student's profile, keyed by the identity provider's subject.
///
/// At most one profile exists per subject. `email` and `hall_ticket` are
/// unique across all profiles; the store enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct Profile {
    pub id: ProfileId,
    pub subject_id: SubjectId,
    pub full_name: String,
    pub email: Email,
    pub phone_number: String,
    pub department: String,
    pub academic_year: String,
    #[cfg_attr(feature = "postgres", sqlx(try_from = "String"))]
    pub hall_ticket: HallTicket,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
}

impl Profile {
    /// First word of the full name, or an empty string for a blank name.
    #[must_use]
    pub fn first_name(&self) -> &str {
        first_name(&self.full_name)
    }
}

/// First whitespace-separated word of a full name.
#[must_use]
pub fn first_name(full_name: &str) -> &str {
    full_name.split_whitespace().next().unwrap_or("")
}

/// Fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub subject_id: SubjectId,
    pub full_name: String,
    pub email: Email,
    pub phone_number: String,
    pub department: String,
    pub academic_year: String,
    pub hall_ticket: HallTicket,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// A profile edit. Absent fields are left unchanged.
///
/// Hall ticket, email and subject are not editable here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub academic_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl ProfileChanges {
    /// True when the edit would change nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.phone_number.is_none()
            && self.department.is_none()
            && self.academic_year.is_none()
            && self.profile_picture_url.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_first_name() {
        assert_eq!(first_name("Asha Rao"), "Asha");
        assert_eq!(first_name("  Ravi   Kumar Teja "), "Ravi");
        assert_eq!(first_name("Madonna"), "Madonna");
        assert_eq!(first_name("   "), "");
    }

    #[test]
    fn test_changes_serialize_only_present_fields() {
        let changes = ProfileChanges {
            department: Some("ECE".to_owned()),
            ..ProfileChanges::default()
        };
        assert!(!changes.is_empty());
        let json = serde_json::to_value(&changes).unwrap();
        assert_eq!(json, serde_json::json!({ "department": "ECE" }));
        assert!(ProfileChanges::default().is_empty());
    }

    #[test]
    fn test_profile_wire_shape() {
        let json = serde_json::json!({
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "subject_id": "uid-1",
            "full_name": "Asha Rao",
            "email": "asha@college.edu",
            "phone_number": "9876543210",
            "department": "CSE",
            "academic_year": "3",
            "hall_ticket": "2023a51234",
            "profile_picture_url": null,
            "is_active": true,
            "email_verified": true
        });
        let profile: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.hall_ticket.as_str(), "2023a51234");
        assert_eq!(profile.first_name(), "Asha");
    }
}
