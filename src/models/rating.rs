// src/models/rating.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::listing::BookingTarget;

/// Represents the 'ratings' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub ride_request_id: Option<Uuid>,
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A rating joined with the rater's display name.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RatingWithRater {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub rating: Rating,
    pub rater_name: String,
}

/// Derived trust signal for a user.
///
/// `average` is `None` when nobody has rated the user yet, which is distinct
/// from a computed average.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: usize,
}

/// DTO for rating a counterpart after a completed trip.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRatingRequest {
    pub rated_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub ride_request_id: Option<Uuid>,
    pub rating: i32,
    #[validate(length(max = 500, message = "Comment must be at most 500 chars"))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub target: BookingTarget,
    pub rating: i32,
    pub comment: Option<String>,
}
