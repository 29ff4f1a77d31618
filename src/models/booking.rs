// src/models/booking.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::text_enum;
use crate::{error::AppError, models::listing::BookingTarget};

text_enum! {
    /// `pending → confirmed → completed`, with `cancelled` reachable from
    /// `pending` and `confirmed`.
    pub enum BookingStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

/// Represents the 'bookings' table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,

    /// Exactly one of `ride_id` / `ride_request_id` is set.
    pub ride_id: Option<Uuid>,
    pub ride_request_id: Option<Uuid>,

    pub passenger_id: Uuid,
    pub driver_id: Uuid,

    /// The user who created the booking: the passenger for a ride,
    /// the driver for a ride request.
    pub booked_by: Uuid,

    pub seats_booked: i32,

    /// `seats_booked × price_per_seat` at creation time.
    pub total_price: i64,

    #[sqlx(try_from = "String")]
    pub status: BookingStatus,

    pub status_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn target(&self) -> Result<BookingTarget, AppError> {
        BookingTarget::from_columns(self.ride_id, self.ride_request_id).ok_or_else(|| {
            AppError::Consistency(format!(
                "booking {} must reference exactly one ride or ride request",
                self.id
            ))
        })
    }

    pub fn targets(&self, target: &BookingTarget) -> bool {
        self.ride_id == target.ride_id() && self.ride_request_id == target.ride_request_id()
    }
}

/// DTO for creating a booking. Exactly one of `ride_id` / `ride_request_id`.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub ride_id: Option<Uuid>,
    pub ride_request_id: Option<Uuid>,
    pub seats: i32,

    /// Client-chosen key; resubmitting the same key returns the original
    /// booking instead of reserving more seats.
    pub idempotency_key: Option<Uuid>,
}

/// Insert payload produced by the transition engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub target: BookingTarget,
    pub passenger_id: Uuid,
    pub driver_id: Uuid,
    pub booked_by: Uuid,
    pub seats_booked: i32,
    pub total_price: i64,
    pub idempotency_key: Option<Uuid>,
}

/// Status change produced by the transition engine for an existing booking.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingChange {
    pub status: BookingStatus,
    pub reason: Option<String>,
    /// Follow-up status for the booked listing, applied in the same unit.
    pub listing_status: Option<crate::models::listing::ListingStatus>,
}

/// Status change for a listing, optionally cancelling its open bookings.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingChange {
    pub status: crate::models::listing::ListingStatus,
    /// When set, every pending/confirmed booking is cancelled with this reason.
    pub cancel_open_bookings: Option<String>,
}
