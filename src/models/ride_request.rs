// src/models/ride_request.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::listing::ListingStatus;

/// Represents the 'ride_requests' table: a passenger's published demand.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub passenger_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    pub preferred_departure_time: DateTime<Utc>,

    /// Seats wanted; the capacity drivers can book against.
    pub requested_seats: i32,

    /// Maximum price per seat the passenger offers.
    pub price_per_seat: i64,

    pub description: Option<String>,

    #[sqlx(try_from = "String")]
    pub status: ListingStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RideRequestView {
    #[serde(flatten)]
    pub request: RideRequest,
    pub remaining_seats: i32,
    pub seats_available: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequestPayload {
    #[validate(length(min = 1, max = 200, message = "Origin must be between 1 and 200 chars"))]
    pub from_location: String,

    #[validate(length(min = 1, max = 200, message = "Destination must be between 1 and 200 chars"))]
    pub to_location: String,

    pub preferred_departure_time: DateTime<Utc>,

    pub requested_seats: i32,

    pub price_per_seat: i64,

    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRideRequestPayload {
    pub preferred_departure_time: Option<DateTime<Utc>>,
    pub price_per_seat: Option<i64>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRideRequest {
    pub passenger_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    pub preferred_departure_time: DateTime<Utc>,
    pub requested_seats: i32,
    pub price_per_seat: i64,
    pub description: Option<String>,
}
