// src/models/stats.rs

use serde::Serialize;
use sqlx::FromRow;

/// Platform-wide counters shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_bookings: i64,
    /// Rides published since midnight UTC.
    pub daily_rides: i64,
    pub total_active_rides: i64,
    pub total_ride_offers: i64,
    /// Active ride requests.
    pub total_ride_requests: i64,
    /// Sum of `total_price` over confirmed and completed bookings.
    pub total_revenue: i64,
}

/// Trip counts for one user, as driver and as passenger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow)]
pub struct UserStats {
    pub rides_offered: i64,
    pub rides_requested: i64,
    pub bookings_as_passenger: i64,
    pub bookings_as_driver: i64,
    pub completed_trips: i64,
    pub cancelled_trips: i64,
}
