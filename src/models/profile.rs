// src/models/profile.rs

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use super::text_enum;
use crate::models::rating::RatingSummary;

text_enum! {
    pub enum VerificationStatus {
        Pending => "pending",
        Verified => "verified",
        Rejected => "rejected",
    }
}

/// Represents the 'profiles' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,

    /// Subject issued by the identity provider. Bound one-to-one to `id`.
    pub external_id: String,

    pub full_name: String,
    pub email: Option<String>,
    pub college: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,

    #[sqlx(try_from = "String")]
    pub verification_status: VerificationStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a profile, with the derived rating.
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub full_name: String,
    pub college: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub verification_status: VerificationStatus,
    pub rating: RatingSummary,
    pub created_at: DateTime<Utc>,
}

impl PublicProfile {
    pub fn new(profile: Profile, rating: RatingSummary) -> Self {
        Self {
            id: profile.id,
            full_name: profile.full_name,
            college: profile.college,
            bio: profile.bio,
            avatar_url: profile.avatar_url,
            verification_status: profile.verification_status,
            rating,
            created_at: profile.created_at,
        }
    }
}

/// The caller's own profile, including contact details.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub rating: RatingSummary,
}

/// Upsert payload built from identity claims.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub external_id: String,
    pub full_name: String,
    pub email: Option<String>,
}

/// DTO for updating the caller's profile. Fields are optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 chars"))]
    pub full_name: Option<String>,

    #[validate(length(max = 100))]
    pub college: Option<String>,

    #[validate(custom(function = validate_phone))]
    pub phone: Option<String>,

    #[validate(length(max = 500, message = "Bio must be at most 500 chars"))]
    pub bio: Option<String>,

    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub avatar_url: Option<String>,
}

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[0-9][0-9 \-]{6,18}[0-9]$").expect("phone pattern is valid")
});

fn validate_phone(phone: &str) -> Result<(), validator::ValidationError> {
    if !PHONE_RE.is_match(phone) {
        return Err(validator::ValidationError::new("invalid_phone"));
    }
    Ok(())
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(validate_phone("+91 98765 43210").is_ok());
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("call me").is_err());
        assert!(validate_phone("12").is_err());
    }

    #[test]
    fn test_update_request_validation() {
        let ok = UpdateProfileRequest {
            college: Some("IIT Delhi".into()),
            avatar_url: Some("https://cdn.example.com/a.png".into()),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = UpdateProfileRequest {
            avatar_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
