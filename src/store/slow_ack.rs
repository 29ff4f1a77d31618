// src/store/slow_ack.rs

//! Test double for a connection that commits a write but answers late.
//!
//! Delegates to a [`MemoryStore`]. The first write that succeeds is applied
//! at once, then its reply is held back for `stall`. A caller whose attempt
//! timeout is shorter sees a timeout for a write that already happened.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    BookingRule, ListingRule, MemoryStore, Store, TransitionOutcome, TransitionRule, WalletRule,
    WalletSnapshot,
};
use crate::{
    error::AppError,
    models::{
        booking::Booking,
        listing::{BookingTarget, Listing, ListingChanges, ListingFilter},
        profile::{NewProfile, Profile, UpdateProfileRequest},
        rating::{NewRating, Rating, RatingWithRater},
        ride::{NewRide, Ride},
        ride_request::{NewRideRequest, RideRequest},
        stats::{DashboardStats, UserStats},
        wallet::{UserWallet, WalletTransaction},
    },
};

pub struct SlowAckStore {
    inner: MemoryStore,
    stall: Duration,
    armed: AtomicBool,
}

impl SlowAckStore {
    pub fn new(stall: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            stall,
            armed: AtomicBool::new(false),
        }
    }

    /// Arms the stall for the next successful write only.
    pub fn stall_next_write(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn acknowledge<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        if result.is_ok() && self.armed.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(self.stall).await;
        }
        result
    }
}

#[async_trait]
impl Store for SlowAckStore {
    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, AppError> {
        self.inner.upsert_profile(new).await
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        self.inner.profile(id).await
    }

    async fn profile_by_external_id(&self, external_id: &str) -> Result<Option<Profile>, AppError> {
        self.inner.profile_by_external_id(external_id).await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &UpdateProfileRequest,
    ) -> Result<Profile, AppError> {
        self.inner.update_profile(id, changes).await
    }

    async fn insert_ride(&self, new: NewRide) -> Result<Ride, AppError> {
        self.inner.insert_ride(new).await
    }

    async fn ride(&self, id: Uuid) -> Result<Option<Ride>, AppError> {
        self.inner.ride(id).await
    }

    async fn list_rides(&self, filter: &ListingFilter) -> Result<Vec<Ride>, AppError> {
        self.inner.list_rides(filter).await
    }

    async fn update_ride(&self, id: Uuid, changes: &ListingChanges) -> Result<Ride, AppError> {
        self.inner.update_ride(id, changes).await
    }

    async fn insert_ride_request(&self, new: NewRideRequest) -> Result<RideRequest, AppError> {
        self.inner.insert_ride_request(new).await
    }

    async fn ride_request(&self, id: Uuid) -> Result<Option<RideRequest>, AppError> {
        self.inner.ride_request(id).await
    }

    async fn list_ride_requests(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<RideRequest>, AppError> {
        self.inner.list_ride_requests(filter).await
    }

    async fn update_ride_request(
        &self,
        id: Uuid,
        changes: &ListingChanges,
    ) -> Result<RideRequest, AppError> {
        self.inner.update_ride_request(id, changes).await
    }

    async fn listing(&self, target: BookingTarget) -> Result<Option<Listing>, AppError> {
        self.inner.listing(target).await
    }

    async fn transition_listing(
        &self,
        target: BookingTarget,
        rule: &ListingRule<'_>,
    ) -> Result<Listing, AppError> {
        let result = self.inner.transition_listing(target, rule).await;
        self.acknowledge(result).await
    }

    async fn create_booking(
        &self,
        target: BookingTarget,
        booked_by: Uuid,
        idempotency_key: Option<Uuid>,
        rule: &BookingRule<'_>,
    ) -> Result<Booking, AppError> {
        let result = self
            .inner
            .create_booking(target, booked_by, idempotency_key, rule)
            .await;
        self.acknowledge(result).await
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        rule: &TransitionRule<'_>,
    ) -> Result<TransitionOutcome, AppError> {
        let result = self.inner.transition_booking(booking_id, rule).await;
        self.acknowledge(result).await
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        self.inner.booking(id).await
    }

    async fn bookings_for_target(&self, target: BookingTarget) -> Result<Vec<Booking>, AppError> {
        self.inner.bookings_for_target(target).await
    }

    async fn bookings_for_targets(
        &self,
        targets: &[BookingTarget],
    ) -> Result<Vec<Booking>, AppError> {
        self.inner.bookings_for_targets(targets).await
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        self.inner.bookings_for_user(user_id).await
    }

    async fn insert_rating(&self, new: NewRating) -> Result<Rating, AppError> {
        self.inner.insert_rating(new).await
    }

    async fn ratings_for_user(&self, user_id: Uuid) -> Result<Vec<RatingWithRater>, AppError> {
        self.inner.ratings_for_user(user_id).await
    }

    async fn apply_wallet_entry(
        &self,
        user_id: Uuid,
        operation_id: Uuid,
        rule: &WalletRule<'_>,
    ) -> Result<(WalletTransaction, UserWallet), AppError> {
        let result = self.inner.apply_wallet_entry(user_id, operation_id, rule).await;
        self.acknowledge(result).await
    }

    async fn wallet(&self, user_id: Uuid) -> Result<Option<UserWallet>, AppError> {
        self.inner.wallet(user_id).await
    }

    async fn wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        self.inner.wallet_transactions(user_id, limit).await
    }

    async fn wallet_snapshot(&self, user_id: Uuid) -> Result<WalletSnapshot, AppError> {
        self.inner.wallet_snapshot(user_id).await
    }

    async fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats, AppError> {
        self.inner.dashboard_stats(since).await
    }

    async fn user_stats(&self, user_id: Uuid) -> Result<UserStats, AppError> {
        self.inner.user_stats(user_id).await
    }
}
