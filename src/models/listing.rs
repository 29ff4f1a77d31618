// src/models/listing.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::text_enum;
use crate::models::{ride::Ride, ride_request::RideRequest};

text_enum! {
    /// Lifecycle of a ride offer or ride request.
    ///
    /// Rides move between `active`, `completed` and `cancelled`; only ride
    /// requests use `booked` (every requested seat is covered by a
    /// confirmed booking).
    pub enum ListingStatus {
        Active => "active",
        Booked => "booked",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

impl ListingStatus {
    /// Whether the listing still takes part in the booking flow.
    pub fn is_open(&self) -> bool {
        matches!(self, ListingStatus::Active | ListingStatus::Booked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingKind {
    Ride,
    RideRequest,
}

/// What a booking or rating points at: a ride offer or a ride request,
/// never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingTarget {
    Ride(Uuid),
    RideRequest(Uuid),
}

impl BookingTarget {
    /// Builds a target from the pair of nullable foreign keys stored on a row.
    pub fn from_columns(ride_id: Option<Uuid>, ride_request_id: Option<Uuid>) -> Option<Self> {
        match (ride_id, ride_request_id) {
            (Some(id), None) => Some(BookingTarget::Ride(id)),
            (None, Some(id)) => Some(BookingTarget::RideRequest(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            BookingTarget::Ride(id) | BookingTarget::RideRequest(id) => *id,
        }
    }

    pub fn kind(&self) -> ListingKind {
        match self {
            BookingTarget::Ride(_) => ListingKind::Ride,
            BookingTarget::RideRequest(_) => ListingKind::RideRequest,
        }
    }

    pub fn ride_id(&self) -> Option<Uuid> {
        match self {
            BookingTarget::Ride(id) => Some(*id),
            BookingTarget::RideRequest(_) => None,
        }
    }

    pub fn ride_request_id(&self) -> Option<Uuid> {
        match self {
            BookingTarget::Ride(_) => None,
            BookingTarget::RideRequest(id) => Some(*id),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookingTarget::Ride(_) => "Ride",
            BookingTarget::RideRequest(_) => "Ride request",
        }
    }
}

/// Snapshot of the fields the ledger needs from a ride or ride request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listing {
    pub target: BookingTarget,
    /// Driver for a ride, passenger for a ride request.
    pub owner_id: Uuid,
    /// Original seat capacity. Remaining seats are always derived.
    pub capacity: i32,
    pub price_per_seat: i64,
    pub status: ListingStatus,
}

impl Listing {
    pub fn kind(&self) -> ListingKind {
        self.target.kind()
    }
}

impl From<&Ride> for Listing {
    fn from(ride: &Ride) -> Self {
        Listing {
            target: BookingTarget::Ride(ride.id),
            owner_id: ride.driver_id,
            capacity: ride.available_seats,
            price_per_seat: ride.price_per_seat,
            status: ride.status,
        }
    }
}

impl From<&RideRequest> for Listing {
    fn from(request: &RideRequest) -> Self {
        Listing {
            target: BookingTarget::RideRequest(request.id),
            owner_id: request.passenger_id,
            capacity: request.requested_seats,
            price_per_seat: request.price_per_seat,
            status: request.status,
        }
    }
}

/// Owner-editable terms shared by rides and ride requests.
/// Capacity is deliberately absent: it is fixed at creation.
#[derive(Debug, Clone, Default)]
pub struct ListingChanges {
    pub price_per_seat: Option<i64>,
    pub description: Option<String>,
    pub departure_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl ListingChanges {
    pub fn is_empty(&self) -> bool {
        self.price_per_seat.is_none() && self.description.is_none() && self.departure_time.is_none()
    }
}

/// Filters for listing rides or ride requests.
#[derive(Debug, Clone)]
pub struct ListingFilter {
    pub status: Option<ListingStatus>,
    pub owner_id: Option<Uuid>,
    /// Case-insensitive substring of origin or destination.
    pub q: Option<String>,
    pub limit: i64,
}

/// Query parameters accepted by the listing endpoints.
#[derive(Debug, Deserialize)]
pub struct ListingListParams {
    /// `active` by default; `all` lifts the filter.
    pub status: Option<String>,
    #[serde(alias = "driver_id", alias = "passenger_id")]
    pub owner_id: Option<Uuid>,
    pub q: Option<String>,
    pub limit: Option<i64>,
}
