// src/handlers/ratings.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    ledger::Ledger,
    models::{listing::BookingTarget, rating::CreateRatingRequest},
    utils::{html::clean_optional, jwt::CurrentUser},
};

/// Rate the counterpart of a completed trip.
pub async fn create_rating(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<CreateRatingRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let trip = BookingTarget::from_columns(payload.ride_id, payload.ride_request_id)
        .ok_or_else(|| {
            AppError::Validation("Provide exactly one of ride_id or ride_request_id".to_string())
        })?;

    let rating = ledger
        .record_rating(
            user.id,
            payload.rated_id,
            trip,
            payload.rating,
            clean_optional(payload.comment.as_deref()),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(rating)))
}

/// Ratings a user received, with the summary shown on their profile.
pub async fn list_for_profile(
    State(ledger): State<Ledger>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ledger
        .query("profile", |store| store.profile(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

    let (ratings, summary) = ledger.ratings_with_summary(id).await?;

    Ok(Json(json!({
        "summary": summary,
        "ratings": ratings,
    })))
}
