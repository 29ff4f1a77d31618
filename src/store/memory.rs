// src/store/memory.rs

//! In-process store used by the test suite and by local runs without
//! `DATABASE_URL`. Every operation runs under one mutex, which makes each
//! rule-driven write atomic with respect to all others.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    BookingRule, ListingRule, Store, TransitionOutcome, TransitionRule, WalletRule,
    WalletSnapshot,
};
use crate::{
    error::AppError,
    models::{
        booking::{Booking, BookingStatus},
        listing::{BookingTarget, Listing, ListingChanges, ListingFilter, ListingStatus},
        profile::{NewProfile, Profile, UpdateProfileRequest, VerificationStatus},
        rating::{NewRating, Rating, RatingWithRater},
        ride::{NewRide, Ride},
        ride_request::{NewRideRequest, RideRequest},
        stats::{DashboardStats, UserStats},
        wallet::{TransactionStatus, UserWallet, WalletTransaction},
    },
};

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, Profile>,
    rides: HashMap<Uuid, Ride>,
    ride_requests: HashMap<Uuid, RideRequest>,
    /// Insertion order doubles as creation order.
    bookings: Vec<Booking>,
    ratings: Vec<Rating>,
    wallets: HashMap<Uuid, UserWallet>,
    transactions: Vec<WalletTransaction>,
}

impl Inner {
    fn listing(&self, target: BookingTarget) -> Option<Listing> {
        match target {
            BookingTarget::Ride(id) => self.rides.get(&id).map(Listing::from),
            BookingTarget::RideRequest(id) => self.ride_requests.get(&id).map(Listing::from),
        }
    }

    fn bookings_for(&self, target: &BookingTarget) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|b| b.targets(target))
            .cloned()
            .collect()
    }

    fn set_listing_status(&mut self, target: BookingTarget, status: ListingStatus, now: DateTime<Utc>) {
        match target {
            BookingTarget::Ride(id) => {
                if let Some(ride) = self.rides.get_mut(&id) {
                    ride.status = status;
                    ride.updated_at = now;
                }
            }
            BookingTarget::RideRequest(id) => {
                if let Some(request) = self.ride_requests.get_mut(&id) {
                    request.status = status;
                    request.updated_at = now;
                }
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    /// Overwrites a cached balance without recording any history.
    #[cfg(test)]
    pub(crate) fn set_cached_balance(&self, user_id: Uuid, balance: i64) -> Result<(), AppError> {
        self.lock()?.wallets.insert(
            user_id,
            UserWallet {
                user_id,
                balance,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

fn listing_not_found(target: BookingTarget) -> AppError {
    AppError::NotFound(format!("{} not found", target.label()))
}

fn matches_filter(
    filter: &ListingFilter,
    owner_id: Uuid,
    status: ListingStatus,
    from: &str,
    to: &str,
) -> bool {
    if filter.status.is_some_and(|s| s != status) {
        return false;
    }
    if filter.owner_id.is_some_and(|o| o != owner_id) {
        return false;
    }
    match &filter.q {
        Some(q) => {
            let q = q.to_lowercase();
            from.to_lowercase().contains(&q) || to.to_lowercase().contains(&q)
        }
        None => true,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, AppError> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        if let Some(existing) = inner
            .profiles
            .values_mut()
            .find(|p| p.external_id == new.external_id)
        {
            if existing.email.is_none() && new.email.is_some() {
                existing.email = new.email;
                existing.updated_at = now;
            }
            return Ok(existing.clone());
        }

        let profile = Profile {
            id: Uuid::new_v4(),
            external_id: new.external_id,
            full_name: new.full_name,
            email: new.email,
            college: None,
            phone: None,
            bio: None,
            avatar_url: None,
            verification_status: VerificationStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        inner.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(self.lock()?.profiles.get(&id).cloned())
    }

    async fn profile_by_external_id(&self, external_id: &str) -> Result<Option<Profile>, AppError> {
        Ok(self
            .lock()?
            .profiles
            .values()
            .find(|p| p.external_id == external_id)
            .cloned())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &UpdateProfileRequest,
    ) -> Result<Profile, AppError> {
        let mut inner = self.lock()?;
        let profile = inner
            .profiles
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;

        if let Some(full_name) = &changes.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(college) = &changes.college {
            profile.college = Some(college.clone());
        }
        if let Some(phone) = &changes.phone {
            profile.phone = Some(phone.clone());
        }
        if let Some(bio) = &changes.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(avatar_url) = &changes.avatar_url {
            profile.avatar_url = Some(avatar_url.clone());
        }
        profile.updated_at = Utc::now();

        Ok(profile.clone())
    }

    async fn insert_ride(&self, new: NewRide) -> Result<Ride, AppError> {
        let now = Utc::now();
        let ride = Ride {
            id: Uuid::new_v4(),
            driver_id: new.driver_id,
            from_location: new.from_location,
            to_location: new.to_location,
            departure_time: new.departure_time,
            available_seats: new.available_seats,
            price_per_seat: new.price_per_seat,
            description: new.description,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.rides.insert(ride.id, ride.clone());
        Ok(ride)
    }

    async fn ride(&self, id: Uuid) -> Result<Option<Ride>, AppError> {
        Ok(self.lock()?.rides.get(&id).cloned())
    }

    async fn list_rides(&self, filter: &ListingFilter) -> Result<Vec<Ride>, AppError> {
        let inner = self.lock()?;
        let mut rides: Vec<Ride> = inner
            .rides
            .values()
            .filter(|r| {
                matches_filter(filter, r.driver_id, r.status, &r.from_location, &r.to_location)
            })
            .cloned()
            .collect();
        rides.sort_by_key(|r| r.departure_time);
        rides.truncate(filter.limit.max(0) as usize);
        Ok(rides)
    }

    async fn update_ride(&self, id: Uuid, changes: &ListingChanges) -> Result<Ride, AppError> {
        let mut inner = self.lock()?;
        let ride = inner
            .rides
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

        if let Some(price) = changes.price_per_seat {
            ride.price_per_seat = price;
        }
        if let Some(description) = &changes.description {
            ride.description = Some(description.clone());
        }
        if let Some(departure) = changes.departure_time {
            ride.departure_time = departure;
        }
        ride.updated_at = Utc::now();

        Ok(ride.clone())
    }

    async fn insert_ride_request(&self, new: NewRideRequest) -> Result<RideRequest, AppError> {
        let now = Utc::now();
        let request = RideRequest {
            id: Uuid::new_v4(),
            passenger_id: new.passenger_id,
            from_location: new.from_location,
            to_location: new.to_location,
            preferred_departure_time: new.preferred_departure_time,
            requested_seats: new.requested_seats,
            price_per_seat: new.price_per_seat,
            description: new.description,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.ride_requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn ride_request(&self, id: Uuid) -> Result<Option<RideRequest>, AppError> {
        Ok(self.lock()?.ride_requests.get(&id).cloned())
    }

    async fn list_ride_requests(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<RideRequest>, AppError> {
        let inner = self.lock()?;
        let mut requests: Vec<RideRequest> = inner
            .ride_requests
            .values()
            .filter(|r| {
                matches_filter(filter, r.passenger_id, r.status, &r.from_location, &r.to_location)
            })
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.preferred_departure_time);
        requests.truncate(filter.limit.max(0) as usize);
        Ok(requests)
    }

    async fn update_ride_request(
        &self,
        id: Uuid,
        changes: &ListingChanges,
    ) -> Result<RideRequest, AppError> {
        let mut inner = self.lock()?;
        let request = inner
            .ride_requests
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))?;

        if let Some(price) = changes.price_per_seat {
            request.price_per_seat = price;
        }
        if let Some(description) = &changes.description {
            request.description = Some(description.clone());
        }
        if let Some(departure) = changes.departure_time {
            request.preferred_departure_time = departure;
        }
        request.updated_at = Utc::now();

        Ok(request.clone())
    }

    async fn listing(&self, target: BookingTarget) -> Result<Option<Listing>, AppError> {
        Ok(self.lock()?.listing(target))
    }

    async fn transition_listing(
        &self,
        target: BookingTarget,
        rule: &ListingRule<'_>,
    ) -> Result<Listing, AppError> {
        let mut inner = self.lock()?;
        let listing = inner.listing(target).ok_or_else(|| listing_not_found(target))?;
        let bookings = inner.bookings_for(&target);

        let change = rule(&listing, &bookings)?;
        let now = Utc::now();

        inner.set_listing_status(target, change.status, now);
        if let Some(reason) = change.cancel_open_bookings {
            for booking in inner.bookings.iter_mut().filter(|b| b.targets(&target)) {
                if matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
                    booking.status = BookingStatus::Cancelled;
                    booking.status_reason = Some(reason.clone());
                    booking.updated_at = now;
                }
            }
        }

        inner.listing(target).ok_or_else(|| listing_not_found(target))
    }

    async fn create_booking(
        &self,
        target: BookingTarget,
        booked_by: Uuid,
        idempotency_key: Option<Uuid>,
        rule: &BookingRule<'_>,
    ) -> Result<Booking, AppError> {
        let mut inner = self.lock()?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = inner
                .bookings
                .iter()
                .find(|b| b.booked_by == booked_by && b.idempotency_key == Some(key))
            {
                return Ok(existing.clone());
            }
        }

        let listing = inner.listing(target).ok_or_else(|| listing_not_found(target))?;
        let bookings = inner.bookings_for(&target);

        let new = rule(&listing, &bookings)?;
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            ride_id: new.target.ride_id(),
            ride_request_id: new.target.ride_request_id(),
            passenger_id: new.passenger_id,
            driver_id: new.driver_id,
            booked_by: new.booked_by,
            seats_booked: new.seats_booked,
            total_price: new.total_price,
            status: BookingStatus::Pending,
            status_reason: None,
            idempotency_key: new.idempotency_key,
            created_at: now,
            updated_at: now,
        };
        inner.bookings.push(booking.clone());

        Ok(booking)
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        rule: &TransitionRule<'_>,
    ) -> Result<TransitionOutcome, AppError> {
        let mut inner = self.lock()?;
        let index = inner
            .bookings
            .iter()
            .position(|b| b.id == booking_id)
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?;

        let booking = inner.bookings[index].clone();
        let target = booking.target()?;
        let listing = inner.listing(target).ok_or_else(|| {
            AppError::Consistency(format!("booking {} references a missing listing", booking.id))
        })?;
        let bookings = inner.bookings_for(&target);

        let change = rule(&listing, &booking, &bookings)?;
        let now = Utc::now();

        let updated = &mut inner.bookings[index];
        updated.status = change.status;
        if change.reason.is_some() {
            updated.status_reason = change.reason;
        }
        updated.updated_at = now;

        if let Some(status) = change.listing_status {
            inner.set_listing_status(target, status, now);
        }

        Ok(TransitionOutcome {
            booking: inner.bookings[index].clone(),
            listing: inner.listing(target).ok_or_else(|| listing_not_found(target))?,
            bookings: inner.bookings_for(&target),
        })
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        Ok(self.lock()?.bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn bookings_for_target(&self, target: BookingTarget) -> Result<Vec<Booking>, AppError> {
        Ok(self.lock()?.bookings_for(&target))
    }

    async fn bookings_for_targets(
        &self,
        targets: &[BookingTarget],
    ) -> Result<Vec<Booking>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .bookings
            .iter()
            .filter(|b| targets.iter().any(|t| b.targets(t)))
            .cloned()
            .collect())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .bookings
            .iter()
            .rev()
            .filter(|b| b.passenger_id == user_id || b.driver_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_rating(&self, new: NewRating) -> Result<Rating, AppError> {
        let mut inner = self.lock()?;
        let ride_id = new.target.ride_id();
        let ride_request_id = new.target.ride_request_id();

        let duplicate = inner.ratings.iter().any(|r| {
            r.rater_id == new.rater_id
                && r.rated_id == new.rated_id
                && r.ride_id == ride_id
                && r.ride_request_id == ride_request_id
        });
        if duplicate {
            return Err(AppError::Conflict("rating already exists".to_string()));
        }

        let rating = Rating {
            id: Uuid::new_v4(),
            rater_id: new.rater_id,
            rated_id: new.rated_id,
            ride_id,
            ride_request_id,
            rating: new.rating,
            comment: new.comment,
            created_at: Utc::now(),
        };
        inner.ratings.push(rating.clone());
        Ok(rating)
    }

    async fn ratings_for_user(&self, user_id: Uuid) -> Result<Vec<RatingWithRater>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .ratings
            .iter()
            .rev()
            .filter(|r| r.rated_id == user_id)
            .map(|r| RatingWithRater {
                rating: r.clone(),
                rater_name: inner
                    .profiles
                    .get(&r.rater_id)
                    .map(|p| p.full_name.clone())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn apply_wallet_entry(
        &self,
        user_id: Uuid,
        operation_id: Uuid,
        rule: &WalletRule<'_>,
    ) -> Result<(WalletTransaction, UserWallet), AppError> {
        let mut inner = self.lock()?;

        if let Some(existing) = inner
            .transactions
            .iter()
            .find(|t| t.user_id == user_id && t.operation_id == operation_id)
        {
            let wallet = inner.wallets.get(&user_id).cloned().ok_or_else(|| {
                AppError::Consistency(format!("wallet entry {} has no wallet", existing.id))
            })?;
            return Ok((existing.clone(), wallet));
        }

        let balance = inner.wallets.get(&user_id).map_or(0, |w| w.balance);

        let entry = rule(balance)?;
        let new_balance = balance.checked_add(entry.signed_amount()).ok_or_else(|| {
            AppError::Consistency(format!("wallet balance overflow for user {}", user_id))
        })?;
        let now = Utc::now();

        let transaction = WalletTransaction {
            id: Uuid::new_v4(),
            user_id,
            operation_id,
            booking_id: entry.booking_id,
            amount: entry.amount,
            transaction_type: entry.transaction_type,
            description: entry.description,
            status: TransactionStatus::Completed,
            created_at: now,
        };
        let wallet = UserWallet {
            user_id,
            balance: new_balance,
            updated_at: now,
        };

        inner.transactions.push(transaction.clone());
        inner.wallets.insert(user_id, wallet.clone());

        Ok((transaction, wallet))
    }

    async fn wallet(&self, user_id: Uuid) -> Result<Option<UserWallet>, AppError> {
        Ok(self.lock()?.wallets.get(&user_id).cloned())
    }

    async fn wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn wallet_snapshot(&self, user_id: Uuid) -> Result<WalletSnapshot, AppError> {
        let inner = self.lock()?;
        Ok(WalletSnapshot {
            wallet: inner.wallets.get(&user_id).cloned(),
            transactions: inner
                .transactions
                .iter()
                .rev()
                .filter(|t| t.user_id == user_id)
                .cloned()
                .collect(),
        })
    }

    async fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats, AppError> {
        let inner = self.lock()?;
        let count = |n: usize| n as i64;

        Ok(DashboardStats {
            total_users: count(inner.profiles.len()),
            total_bookings: count(inner.bookings.len()),
            daily_rides: count(inner.rides.values().filter(|r| r.created_at >= since).count()),
            total_active_rides: count(
                inner
                    .rides
                    .values()
                    .filter(|r| r.status == ListingStatus::Active)
                    .count(),
            ),
            total_ride_offers: count(inner.rides.len()),
            total_ride_requests: count(
                inner
                    .ride_requests
                    .values()
                    .filter(|r| r.status == ListingStatus::Active)
                    .count(),
            ),
            total_revenue: inner
                .bookings
                .iter()
                .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Completed))
                .map(|b| b.total_price)
                .sum(),
        })
    }

    async fn user_stats(&self, user_id: Uuid) -> Result<UserStats, AppError> {
        let inner = self.lock()?;
        let involved: Vec<&Booking> = inner
            .bookings
            .iter()
            .filter(|b| b.passenger_id == user_id || b.driver_id == user_id)
            .collect();
        let with_status =
            |status: BookingStatus| involved.iter().filter(|b| b.status == status).count() as i64;

        Ok(UserStats {
            rides_offered: inner.rides.values().filter(|r| r.driver_id == user_id).count() as i64,
            rides_requested: inner
                .ride_requests
                .values()
                .filter(|r| r.passenger_id == user_id)
                .count() as i64,
            bookings_as_passenger: involved.iter().filter(|b| b.passenger_id == user_id).count()
                as i64,
            bookings_as_driver: involved.iter().filter(|b| b.driver_id == user_id).count() as i64,
            completed_trips: with_status(BookingStatus::Completed),
            cancelled_trips: with_status(BookingStatus::Cancelled),
        })
    }
}
