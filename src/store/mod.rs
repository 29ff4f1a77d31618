// src/store/mod.rs

//! Entity store: the typed repository every handler and ledger operation
//! goes through.
//!
//! Reads are plain queries. Writes that must respect a ledger invariant take
//! a *rule*: the store opens its atomic section (a row-locking transaction in
//! Postgres, a single lock in memory), loads the current state, lets the rule
//! decide, and persists the decision before anyone else can observe the
//! intermediate state. A rule returning `Err` aborts with nothing written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        booking::{Booking, BookingChange, ListingChange, NewBooking},
        listing::{BookingTarget, Listing, ListingChanges, ListingFilter},
        profile::{NewProfile, Profile, UpdateProfileRequest},
        rating::{NewRating, Rating, RatingWithRater},
        ride::{NewRide, Ride},
        ride_request::{NewRideRequest, RideRequest},
        stats::{DashboardStats, UserStats},
        wallet::{NewWalletEntry, UserWallet, WalletTransaction},
    },
};

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod slow_ack;

pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(test)]
pub use slow_ack::SlowAckStore;

/// Decides a new booking from the locked listing and its bookings.
pub type BookingRule<'r> =
    dyn Fn(&Listing, &[Booking]) -> Result<NewBooking, AppError> + Send + Sync + 'r;

/// Decides a status change for one booking of the locked listing.
pub type TransitionRule<'r> =
    dyn Fn(&Listing, &Booking, &[Booking]) -> Result<BookingChange, AppError> + Send + Sync + 'r;

/// Decides a status change for the locked listing itself.
pub type ListingRule<'r> =
    dyn Fn(&Listing, &[Booking]) -> Result<ListingChange, AppError> + Send + Sync + 'r;

/// Decides a wallet entry from the locked balance.
pub type WalletRule<'r> = dyn Fn(i64) -> Result<NewWalletEntry, AppError> + Send + Sync + 'r;

/// State of a listing right after a booking transition was applied.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub booking: Booking,
    pub listing: Listing,
    /// Every booking of the listing, including the updated one.
    pub bookings: Vec<Booking>,
}

/// Wallet row and full history read from one consistent snapshot.
#[derive(Debug, Clone)]
pub struct WalletSnapshot {
    pub wallet: Option<UserWallet>,
    pub transactions: Vec<WalletTransaction>,
}

#[async_trait]
pub trait Store: Send + Sync {
    // --- profiles ---

    /// Creates the profile for an external identity, or returns the existing
    /// one unchanged apart from a missing email.
    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, AppError>;
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, AppError>;
    async fn profile_by_external_id(&self, external_id: &str) -> Result<Option<Profile>, AppError>;
    async fn update_profile(
        &self,
        id: Uuid,
        changes: &UpdateProfileRequest,
    ) -> Result<Profile, AppError>;

    // --- listings ---

    async fn insert_ride(&self, new: NewRide) -> Result<Ride, AppError>;
    async fn ride(&self, id: Uuid) -> Result<Option<Ride>, AppError>;
    async fn list_rides(&self, filter: &ListingFilter) -> Result<Vec<Ride>, AppError>;
    async fn update_ride(&self, id: Uuid, changes: &ListingChanges) -> Result<Ride, AppError>;

    async fn insert_ride_request(&self, new: NewRideRequest) -> Result<RideRequest, AppError>;
    async fn ride_request(&self, id: Uuid) -> Result<Option<RideRequest>, AppError>;
    async fn list_ride_requests(&self, filter: &ListingFilter)
    -> Result<Vec<RideRequest>, AppError>;
    async fn update_ride_request(
        &self,
        id: Uuid,
        changes: &ListingChanges,
    ) -> Result<RideRequest, AppError>;

    async fn listing(&self, target: BookingTarget) -> Result<Option<Listing>, AppError>;

    /// Applies `rule` to the locked listing and persists the new status.
    async fn transition_listing(
        &self,
        target: BookingTarget,
        rule: &ListingRule<'_>,
    ) -> Result<Listing, AppError>;

    // --- bookings ---

    /// Inserts the booking decided by `rule` while the listing is locked.
    ///
    /// When `(booked_by, idempotency_key)` already names a booking, that
    /// booking is returned and `rule` is not consulted.
    async fn create_booking(
        &self,
        target: BookingTarget,
        booked_by: Uuid,
        idempotency_key: Option<Uuid>,
        rule: &BookingRule<'_>,
    ) -> Result<Booking, AppError>;

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        rule: &TransitionRule<'_>,
    ) -> Result<TransitionOutcome, AppError>;

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError>;
    async fn bookings_for_target(&self, target: BookingTarget) -> Result<Vec<Booking>, AppError>;
    async fn bookings_for_targets(
        &self,
        targets: &[BookingTarget],
    ) -> Result<Vec<Booking>, AppError>;
    /// Bookings where the user is passenger or driver, newest first.
    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError>;

    // --- ratings ---

    /// Fails with `AppError::Conflict` when (rater, rated, trip) exists.
    async fn insert_rating(&self, new: NewRating) -> Result<Rating, AppError>;
    /// Ratings received by the user, newest first.
    async fn ratings_for_user(&self, user_id: Uuid) -> Result<Vec<RatingWithRater>, AppError>;

    // --- wallet ---

    /// Appends the entry decided by `rule` and moves the cached balance by
    /// the same amount, both or neither.
    ///
    /// When `(user_id, operation_id)` already names an entry, that entry and
    /// the current wallet are returned and `rule` is not consulted.
    async fn apply_wallet_entry(
        &self,
        user_id: Uuid,
        operation_id: Uuid,
        rule: &WalletRule<'_>,
    ) -> Result<(WalletTransaction, UserWallet), AppError>;
    async fn wallet(&self, user_id: Uuid) -> Result<Option<UserWallet>, AppError>;
    async fn wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError>;
    async fn wallet_snapshot(&self, user_id: Uuid) -> Result<WalletSnapshot, AppError>;

    // --- stats ---

    async fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats, AppError>;
    async fn user_stats(&self, user_id: Uuid) -> Result<UserStats, AppError>;
}
