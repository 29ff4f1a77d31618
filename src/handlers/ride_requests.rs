// src/handlers/ride_requests.rs

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
        ride_request::{
            CreateRideRequestPayload, NewRideRequest, RideRequest, RideRequestView,
            UpdateRideRequestPayload,
        },
    },
    utils::{html::clean_optional, jwt::CurrentUser},
};

async fn request_views(
    ledger: &Ledger,
    requests: Vec<RideRequest>,
) -> Result<Vec<RideRequestView>, AppError> {
    let targets: Vec<BookingTarget> = requests
        .iter()
        .map(|r| BookingTarget::RideRequest(r.id))
        .collect();
    let targets = &targets;
    let bookings = ledger
        .query("bookings_for_targets", move |store| store.bookings_for_targets(targets))
        .await?;

    requests
        .into_iter()
        .map(|request| {
            let listing = Listing::from(&request);
            let remaining_seats = availability::remaining_for(&listing, &bookings)?;
            Ok(RideRequestView {
                seats_available: request.status == ListingStatus::Active && remaining_seats > 0,
                remaining_seats,
                request,
            })
        })
        .collect()
}

async fn request_view(ledger: &Ledger, request: RideRequest) -> Result<RideRequestView, AppError> {
    request_views(ledger, vec![request])
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("ride request view missing".to_string()))
}

async fn find_request(ledger: &Ledger, id: Uuid) -> Result<RideRequest, AppError> {
    ledger
        .query("ride_request", |store| store.ride_request(id))
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))
}

/// Publish a ride request that drivers can book against.
pub async fn create_request(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Json(payload): Json<CreateRideRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    validate_seats(payload.requested_seats)?;
    validate_price(payload.price_per_seat)?;
    validate_departure(payload.preferred_departure_time)?;

    let new = NewRideRequest {
        passenger_id: user.id,
        from_location: payload.from_location.trim().to_string(),
        to_location: payload.to_location.trim().to_string(),
        preferred_departure_time: payload.preferred_departure_time,
        requested_seats: payload.requested_seats,
        price_per_seat: payload.price_per_seat,
        description: clean_optional(payload.description.as_deref()),
    };

    let request = ledger
        .query("insert_ride_request", |store| store.insert_ride_request(new.clone()))
        .await
        .inspect_err(|e| tracing::error!("Failed to create ride request: {:?}", e))?;

    tracing::info!(
        ride_request_id = %request.id,
        user_id = %user.id,
        seats = request.requested_seats,
        "Ride request published"
    );
    Ok((StatusCode::CREATED, Json(request_view(&ledger, request).await?)))
}

pub async fn list_requests(
    State(ledger): State<Ledger>,
    Query(params): Query<ListingListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = listing_filter(params)?;
    let filter = &filter;

    let requests = ledger
        .query("list_ride_requests", move |store| store.list_ride_requests(filter))
        .await?;

    Ok(Json(request_views(&ledger, requests).await?))
}

pub async fn get_request(
    State(ledger): State<Ledger>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let request = find_request(&ledger, id).await?;
    Ok(Json(request_view(&ledger, request).await?))
}

pub async fn update_request(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRideRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let request = find_request(&ledger, id).await?;
    if request.passenger_id != user.id {
        return Err(AppError::Unauthorized(
            "Only the passenger can edit this ride request".to_string(),
        ));
    }
    if request.status != ListingStatus::Active {
        return Err(AppError::Conflict(
            "Only active ride requests can be edited".to_string(),
        ));
    }

    let changes = listing_changes(
        payload.price_per_seat,
        payload.description.as_deref(),
        payload.preferred_departure_time,
    )?;
    let changes = &changes;

    let request = ledger
        .query("update_ride_request", move |store| {
            store.update_ride_request(id, changes)
        })
        .await?;

    tracing::info!(ride_request_id = %id, "Ride request updated");
    Ok(Json(request_view(&ledger, request).await?))
}

pub async fn complete_request(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ledger
        .complete_listing(user.id, BookingTarget::RideRequest(id))
        .await?;

    let request = find_request(&ledger, id).await?;
    Ok(Json(request_view(&ledger, request).await?))
}

pub async fn cancel_request(
    State(ledger): State<Ledger>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    ledger
        .cancel_listing(user.id, BookingTarget::RideRequest(id))
        .await?;

    let request = find_request(&ledger, id).await?;
    Ok(Json(request_view(&ledger, request).await?))
}
