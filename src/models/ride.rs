// src/models/ride.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::listing::ListingStatus;

/// Represents the 'rides' table: a driver's published trip.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    pub departure_time: DateTime<Utc>,

    /// Seat capacity as published. Never decremented by bookings.
    pub available_seats: i32,

    pub price_per_seat: i64,
    pub description: Option<String>,

    #[sqlx(try_from = "String")]
    pub status: ListingStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A ride together with its derived availability.
#[derive(Debug, Serialize)]
pub struct RideView {
    #[serde(flatten)]
    pub ride: Ride,
    pub remaining_seats: i32,
    pub is_available: bool,
}

/// DTO for publishing a ride.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRideRequest {
    #[validate(length(min = 1, max = 200, message = "Origin must be between 1 and 200 chars"))]
    pub from_location: String,

    #[validate(length(min = 1, max = 200, message = "Destination must be between 1 and 200 chars"))]
    pub to_location: String,

    pub departure_time: DateTime<Utc>,

    pub available_seats: i32,

    pub price_per_seat: i64,

    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// DTO for editing a ride. Capacity cannot be changed once published.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRideRequest {
    pub departure_time: Option<DateTime<Utc>>,
    pub price_per_seat: Option<i64>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

/// Insert payload handed to the store.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub driver_id: Uuid,
    pub from_location: String,
    pub to_location: String,
    pub departure_time: DateTime<Utc>,
    pub available_seats: i32,
    pub price_per_seat: i64,
    pub description: Option<String>,
}
