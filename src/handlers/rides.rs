// src/handlers/rides.rs

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use super::{listing_changes, listing_filter, validate_departure, validate_price, validate_seats};
use crate::{
    error::AppError,
    ledger::{Ledger, availability},
    models::{
        listing::{BookingTarget, Listing, ListingListParams, ListingStatus},
        ride::{CreateRideRequest, NewRide, Ride, RideView, UpdateRideRequest},
    },
    utils::{html::clean_optional, jwt::CurrentUser},
};

/// Attaches derived availability to each ride with one bookings query.
async fn ride_views(ledger: &Ledger, rides: Vec<Ride>) -> Result<Vec<RideView>, AppError> {
    let targets: Vec<BookingTarget> = rides.iter().map(|r| BookingTarget::Ride(r.id)).collect();
    let targets = &targets;
    let bookings = ledger
        .query("bookings_for_targets", move |store| store.bookings_for_targets(targets))
        .await?;

    rides
        .into_iter()
        .map(|ride| {
            let listing = Listing::from(&ride);
            let remaining_seats = availability::remaining_for(&listing, &bookings)?;
            Ok(RideView {
                is_available: ride.status == ListingStatus::Active && remaining_seats > 0,
                remaining_seats,
                ride,
            })
        })
        .collect()
}

async fn ride_view(ledger: &Ledger, ride: Ride) -> Result<RideView, AppError> {
    ride_views(ledger, vec![ride])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("ride view missing".to_string()))
}

async fn find_ride(ledger: &Ledger, id: Uuid) -> Result<Ride, AppError> {
    ledger
        .query("ride", |store| store.ride(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

/// Publish a ride offer.
pub async fn create_ride(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<CreateRideRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    validate_seats(payload.available_seats)?;
    validate_price(payload.price_per_seat)?;
    validate_departure(payload.departure_time)?;

    let new = NewRide {
        driver_id: user.id,
        from_location: payload.from_location.trim().to_string(),
        to_location: payload.to_location.trim().to_string(),
        departure_time: payload.departure_time,
        available_seats: payload.available_seats,
        price_per_seat: payload.price_per_seat,
        description: clean_optional(payload.description.as_deref()),
    };

    let ride = ledger
        .query("insert_ride", |store| store.insert_ride(new.clone()))
        .await
        .inspect_err(|e| tracing::error!("Failed to create ride: {:?}", e))?;

    tracing::info!(ride_id = %ride.id, user_id = %user.id, seats = ride.available_seats, "Ride published");
    Ok((StatusCode::CREATED, Json(ride_view(&ledger, ride).await?)))
}

/// List rides, soonest departure first.
/// Supports `status`, `owner_id`, `q` (origin/destination substring) and `limit`.
pub async fn list_rides(
    State(ledger): State<Ledger>,
    Query(params): Query<ListingListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = listing_filter(params)?;
    let filter = &filter;

    let rides = ledger
        .query("list_rides", move |store| store.list_rides(filter))
        .await?;

    Ok(Json(ride_views(&ledger, rides).await?))
}

pub async fn get_ride(
    State(ledger): State<Ledger>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let ride = find_ride(&ledger, id).await?;
    Ok(Json(ride_view(&ledger, ride).await?))
}

/// Edit price, description or departure. Capacity is fixed once published.
pub async fn update_ride(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRideRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let ride = find_ride(&ledger, id).await?;
    if ride.driver_id != user.id {
        return Err(AppError::Unauthorized(
            "Only the driver can edit this ride".to_string(),
        ));
    }
    if ride.status != ListingStatus::Active {
        return Err(AppError::Conflict("Only active rides can be edited".to_string()));
    }

    let changes = listing_changes(
        payload.price_per_seat,
        payload.description.as_deref(),
        payload.departure_time,
    )?;
    let changes = &changes;

    let ride = ledger
        .query("update_ride", move |store| store.update_ride(id, changes))
        .await?;

    tracing::info!(ride_id = %id, "Ride updated");
    Ok(Json(ride_view(&ledger, ride).await?))
}

/// Mark the trip as done; it stops taking bookings and opens for ratings.
pub async fn complete_ride(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ledger.complete_listing(user.id, BookingTarget::Ride(id)).await?;

    let ride = find_ride(&ledger, id).await?;
    Ok(Json(ride_view(&ledger, ride).await?))
}

/// Cancel the ride and every open booking on it.
pub async fn cancel_ride(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ledger.cancel_listing(user.id, BookingTarget::Ride(id)).await?;

    let ride = find_ride(&ledger, id).await?;
    Ok(Json(ride_view(&ledger, ride).await?))
}
