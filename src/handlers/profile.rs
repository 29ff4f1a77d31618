// src/handlers/profile.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    ledger::Ledger,
    models::profile::{MeResponse, PublicProfile, UpdateProfileRequest},
    utils::{
        html::{clean_html, clean_optional},
        jwt::CurrentUser,
    },
};

/// Get the caller's full profile with their rating summary.
pub async fn get_me(
    State(ledger): State<Ledger>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let profile = ledger
        .query("profile", |store| store.profile(user.id))
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    let rating = ledger.average_rating(user.id).await?;

    Ok(Json(MeResponse { profile, rating }))
}

/// Update the caller's profile. Omitted fields are left unchanged.
pub async fn update_me(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let changes = UpdateProfileRequest {
        full_name: payload
            .full_name
            .as_deref()
            .map(|n| clean_html(n.trim()))
            .filter(|n| !n.is_empty()),
        college: clean_optional(payload.college.as_deref()),
        phone: payload.phone.map(|p| p.trim().to_string()),
        bio: clean_optional(payload.bio.as_deref()),
        avatar_url: payload.avatar_url,
    };

    let profile = ledger
        .query("update_profile", |store| store.update_profile(user.id, &changes))
        .await
        .inspect_err(|e| tracing::error!("Failed to update profile: {:?}", e))?;

    tracing::info!(user_id = %user.id, "Profile updated");
    Ok(Json(profile))
}

/// Trip counters for the caller.
pub async fn my_stats(
    State(ledger): State<Ledger>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let stats = ledger
        .query("user_stats", |store| store.user_stats(user.id))
        .await?;

    Ok(Json(stats))
}

/// Public view of another user's profile.
pub async fn get_profile(
    State(ledger): State<Ledger>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let profile = ledger
        .query("profile", |store| store.profile(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    let rating = ledger.average_rating(id).await?;

    Ok(Json(PublicProfile::new(profile, rating)))
}
