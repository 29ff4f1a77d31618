// src/handlers/bookings.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    ledger::Ledger,
    models::{booking::CreateBookingRequest, listing::BookingTarget},
    utils::jwt::CurrentUser,
};

/// Book seats on a ride, or offer to drive a ride request.
pub async fn create_booking(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let target = BookingTarget::from_columns(payload.ride_id, payload.ride_request_id)
        .ok_or_else(|| {
            AppError::Validation("Provide exactly one of ride_id or ride_request_id".to_string())
        })?;

    let booking = ledger
        .create_booking(user.id, target, payload.seats, payload.idempotency_key)
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn confirm_booking(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = ledger.confirm_booking(user.id, id).await?;
    Ok(Json(booking))
}

pub async fn complete_booking(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = ledger.complete_booking(user.id, id).await?;
    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = ledger.cancel_booking(user.id, id).await?;
    Ok(Json(booking))
}

/// Bookings where the caller is passenger or driver, newest first.
pub async fn my_bookings(
    State(ledger): State<Ledger>,
    user: CurrentUser,
) -> Result<impl IntoResponse, AppError> {
    let bookings = ledger
        .query("bookings_for_user", |store| store.bookings_for_user(user.id))
        .await?;

    Ok(Json(bookings))
}

/// A single booking, visible to its passenger and driver only.
pub async fn get_booking(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = ledger
        .query("booking", |store| store.booking(id))
        .await?
        .filter(|b| b.passenger_id == user.id || b.driver_id == user.id)
        .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

    Ok(Json(booking))
}
