// src/ledger/bookings.rs

//! Booking state machine.
//!
//! ```text
//! pending ──► confirmed ──► completed
//!    │            │
//!    └────────────┴──► cancelled
//! ```
//!
//! The `plan_*` functions decide a change from state the store has locked;
//! the async operations on [`Ledger`] hand them to the store so the decision
//! and the write happen in one atomic section.
//!
//! A retried attempt may find that an earlier attempt already committed. The
//! `replayed_*` functions recognise that state so the retry reports the
//! committed change instead of an `InvalidTransition`.

use uuid::Uuid;

use super::{Ledger, availability};
use crate::{
    error::AppError,
    models::{
        booking::{Booking, BookingChange, BookingStatus, ListingChange, NewBooking},
        listing::{BookingTarget, Listing, ListingKind, ListingStatus},
    },
    store::TransitionOutcome,
    utils::retry::{with_retry, with_retry_attempts},
};

pub const REASON_CAPACITY_AT_CONFIRMATION: &str = "capacity exceeded at confirmation";
pub const REASON_LISTING_CANCELLED: &str = "listing cancelled";
pub const REASON_CANCELLED_BY_OWNER: &str = "cancelled by listing owner";
pub const REASON_CANCELLED_BY_BOOKER: &str = "cancelled by booker";

pub fn can_transition_to(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;

    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
    )
}

pub fn ensure_transition(from: BookingStatus, to: BookingStatus) -> Result<(), AppError> {
    if can_transition_to(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn ensure_owner(listing: &Listing, actor: Uuid, action: &str) -> Result<(), AppError> {
    if listing.owner_id != actor {
        return Err(AppError::Unauthorized(format!(
            "Only the owner of this {} can {}",
            listing.target.label().to_lowercase(),
            action
        )));
    }
    Ok(())
}

fn ensure_listing_open(listing: &Listing, to: &str) -> Result<(), AppError> {
    if !listing.status.is_open() {
        return Err(AppError::InvalidTransition {
            from: listing.status.to_string(),
            to: to.to_string(),
        });
    }
    Ok(())
}

/// Decides a new `pending` booking of `seats` on `listing` by `actor`.
pub fn plan_booking(
    listing: &Listing,
    bookings: &[Booking],
    actor: Uuid,
    seats: i32,
    idempotency_key: Option<Uuid>,
) -> Result<NewBooking, AppError> {
    if seats < 1 {
        return Err(AppError::Validation("At least one seat must be booked".to_string()));
    }
    if listing.status != ListingStatus::Active {
        return Err(AppError::NotFound(format!(
            "{} not found or no longer accepting bookings",
            listing.target.label()
        )));
    }
    if listing.owner_id == actor {
        return Err(AppError::SelfBookingDenied);
    }

    let remaining = availability::remaining_seats(listing.capacity, bookings)?;
    if remaining < seats {
        return Err(AppError::CapacityExceeded {
            requested: seats,
            remaining,
        });
    }

    let total_price = listing
        .price_per_seat
        .checked_mul(seats as i64)
        .ok_or_else(|| AppError::Validation("Total price is out of range".to_string()))?;

    let (passenger_id, driver_id) = match listing.kind() {
        ListingKind::Ride => (actor, listing.owner_id),
        ListingKind::RideRequest => (listing.owner_id, actor),
    };

    Ok(NewBooking {
        target: listing.target,
        passenger_id,
        driver_id,
        booked_by: actor,
        seats_booked: seats,
        total_price,
        idempotency_key,
    })
}

/// Decides the outcome of the owner confirming `booking`.
///
/// Capacity is checked again against confirmed and completed seats. When it
/// no longer fits, the booking is cancelled instead of confirmed.
pub fn plan_confirm(
    listing: &Listing,
    booking: &Booking,
    bookings: &[Booking],
    actor: Uuid,
) -> Result<BookingChange, AppError> {
    ensure_owner(listing, actor, "confirm bookings")?;
    ensure_transition(booking.status, BookingStatus::Confirmed)?;
    ensure_listing_open(listing, BookingStatus::Confirmed.as_str())?;

    let confirmed_seats: i32 = bookings
        .iter()
        .filter(|b| b.id != booking.id)
        .filter(|b| matches!(b.status, BookingStatus::Confirmed | BookingStatus::Completed))
        .map(|b| b.seats_booked)
        .sum();
    let after = confirmed_seats + booking.seats_booked;

    if after > listing.capacity {
        return Ok(BookingChange {
            status: BookingStatus::Cancelled,
            reason: Some(REASON_CAPACITY_AT_CONFIRMATION.to_string()),
            listing_status: None,
        });
    }

    // A request whose every seat is covered stops taking offers.
    let listing_status = (listing.kind() == ListingKind::RideRequest
        && listing.status == ListingStatus::Active
        && after == listing.capacity)
        .then_some(ListingStatus::Booked);

    Ok(BookingChange {
        status: BookingStatus::Confirmed,
        reason: None,
        listing_status,
    })
}

pub fn plan_complete_booking(
    listing: &Listing,
    booking: &Booking,
    actor: Uuid,
) -> Result<BookingChange, AppError> {
    ensure_owner(listing, actor, "complete bookings")?;
    ensure_transition(booking.status, BookingStatus::Completed)?;

    Ok(BookingChange {
        status: BookingStatus::Completed,
        reason: None,
        listing_status: None,
    })
}

/// Reason a cancellation by `actor` records, or `None` when `actor` is on
/// neither side of the booking.
fn cancel_reason(listing: &Listing, booking: &Booking, actor: Uuid) -> Option<&'static str> {
    if actor == listing.owner_id {
        Some(REASON_CANCELLED_BY_OWNER)
    } else if actor == booking.booked_by {
        Some(REASON_CANCELLED_BY_BOOKER)
    } else {
        None
    }
}

/// Either side of a booking may cancel it while it is pending or confirmed.
pub fn plan_cancel(
    listing: &Listing,
    booking: &Booking,
    actor: Uuid,
) -> Result<BookingChange, AppError> {
    let reason = cancel_reason(listing, booking, actor).ok_or_else(|| {
        AppError::Unauthorized(
            "Only the booker or the listing owner can cancel this booking".to_string(),
        )
    })?;
    ensure_transition(booking.status, BookingStatus::Cancelled)?;

    let listing_status =
        (listing.status == ListingStatus::Booked).then_some(ListingStatus::Active);

    Ok(BookingChange {
        status: BookingStatus::Cancelled,
        reason: Some(reason.to_string()),
        listing_status,
    })
}

pub fn plan_listing_completion(listing: &Listing, actor: Uuid) -> Result<ListingChange, AppError> {
    ensure_owner(listing, actor, "complete it")?;
    ensure_listing_open(listing, ListingStatus::Completed.as_str())?;

    Ok(ListingChange {
        status: ListingStatus::Completed,
        cancel_open_bookings: None,
    })
}

pub fn plan_listing_cancellation(
    listing: &Listing,
    actor: Uuid,
) -> Result<ListingChange, AppError> {
    ensure_owner(listing, actor, "cancel it")?;
    ensure_listing_open(listing, ListingStatus::Cancelled.as_str())?;

    Ok(ListingChange {
        status: ListingStatus::Cancelled,
        cancel_open_bookings: Some(REASON_LISTING_CANCELLED.to_string()),
    })
}

/// The change that leaves `booking` as it is, when it already sits in
/// `status` with `reason`.
fn already_applied(
    booking: &Booking,
    status: BookingStatus,
    reason: Option<&str>,
) -> Option<BookingChange> {
    (booking.status == status && booking.status_reason.as_deref() == reason).then(|| {
        BookingChange {
            status,
            reason: reason.map(str::to_string),
            listing_status: None,
        }
    })
}

/// Confirmation committed by an earlier attempt, including one that ended in
/// a cancellation for lack of seats.
pub fn replayed_confirm(listing: &Listing, booking: &Booking, actor: Uuid) -> Option<BookingChange> {
    if listing.owner_id != actor {
        return None;
    }
    already_applied(booking, BookingStatus::Confirmed, None).or_else(|| {
        already_applied(
            booking,
            BookingStatus::Cancelled,
            Some(REASON_CAPACITY_AT_CONFIRMATION),
        )
    })
}

pub fn replayed_completion(
    listing: &Listing,
    booking: &Booking,
    actor: Uuid,
) -> Option<BookingChange> {
    if listing.owner_id != actor {
        return None;
    }
    already_applied(booking, BookingStatus::Completed, None)
}

/// Only a cancellation carrying the reason this `actor` would record counts.
pub fn replayed_cancel(listing: &Listing, booking: &Booking, actor: Uuid) -> Option<BookingChange> {
    let reason = cancel_reason(listing, booking, actor)?;
    already_applied(booking, BookingStatus::Cancelled, Some(reason))
}

/// The owner's listing change, when the listing already carries `change.status`.
pub fn replayed_listing_change(
    listing: &Listing,
    actor: Uuid,
    change: ListingChange,
) -> Option<ListingChange> {
    (listing.owner_id == actor && listing.status == change.status).then_some(change)
}

impl Ledger {
    /// Reserves `seats` on `target` for `actor`.
    ///
    /// Resubmitting with the same `idempotency_key` returns the booking the
    /// key first produced. Without a key one is generated, so a retried
    /// attempt never reserves twice. Reusing a key for a different target or
    /// seat count is a `Conflict`.
    pub async fn create_booking(
        &self,
        actor: Uuid,
        target: BookingTarget,
        seats: i32,
        idempotency_key: Option<Uuid>,
    ) -> Result<Booking, AppError> {
        if seats < 1 {
            return Err(AppError::Validation("At least one seat must be booked".to_string()));
        }

        let key = idempotency_key.unwrap_or_else(Uuid::new_v4);
        let rule = move |listing: &Listing, bookings: &[Booking]| {
            plan_booking(listing, bookings, actor, seats, Some(key))
        };
        let store = self.store();

        let booking = with_retry(&self.retry, "create_booking", || {
            store.create_booking(target, actor, Some(key), &rule)
        })
        .await
        .inspect_err(|e| {
            tracing::info!(listing_id = %target.id(), user_id = %actor, seats, error = %e, "Booking rejected");
        })?;

        if booking.target()? != target || booking.seats_booked != seats {
            tracing::warn!(
                booking_id = %booking.id,
                user_id = %actor,
                idempotency_key = %key,
                "Idempotency key reused for a different booking"
            );
            return Err(AppError::Conflict(
                "This idempotency key was already used for a different booking".to_string(),
            ));
        }

        tracing::info!(
            booking_id = %booking.id,
            listing_id = %target.id(),
            user_id = %actor,
            seats,
            total_price = booking.total_price,
            "Booking created"
        );
        Ok(booking)
    }

    /// Runs a booking transition. `rule` receives `true` on retried attempts.
    async fn transition<R>(
        &self,
        op: &'static str,
        booking_id: Uuid,
        rule: R,
    ) -> Result<TransitionOutcome, AppError>
    where
        R: Fn(&Listing, &Booking, &[Booking], bool) -> Result<BookingChange, AppError>
            + Send
            + Sync,
    {
        let store = self.store();
        let rule = &rule;

        with_retry_attempts(&self.retry, op, move |attempt| async move {
            let retried = attempt > 0;
            let apply = move |listing: &Listing, booking: &Booking, bookings: &[Booking]| {
                rule(listing, booking, bookings, retried)
            };
            store.transition_booking(booking_id, &apply).await
        })
        .await
    }

    /// Runs a listing transition. `rule` receives `true` on retried attempts.
    async fn listing_transition<R>(
        &self,
        op: &'static str,
        target: BookingTarget,
        rule: R,
    ) -> Result<Listing, AppError>
    where
        R: Fn(&Listing, bool) -> Result<ListingChange, AppError> + Send + Sync,
    {
        let store = self.store();
        let rule = &rule;

        with_retry_attempts(&self.retry, op, move |attempt| async move {
            let retried = attempt > 0;
            let apply = move |listing: &Listing, _: &[Booking]| rule(listing, retried);
            store.transition_listing(target, &apply).await
        })
        .await
    }

    /// Confirms a pending booking. Fails with `CapacityExceeded` if the
    /// booking had to be cancelled because its seats no longer fit.
    pub async fn confirm_booking(&self, actor: Uuid, booking_id: Uuid) -> Result<Booking, AppError> {
        let rule =
            move |listing: &Listing, booking: &Booking, bookings: &[Booking], retried: bool| {
                match retried.then(|| replayed_confirm(listing, booking, actor)).flatten() {
                    Some(change) => Ok(change),
                    None => plan_confirm(listing, booking, bookings, actor),
                }
            };
        let outcome = self.transition("confirm_booking", booking_id, rule).await?;

        if outcome.booking.status == BookingStatus::Cancelled {
            let remaining =
                availability::remaining_seats(outcome.listing.capacity, &outcome.bookings)?;
            tracing::warn!(
                booking_id = %booking_id,
                listing_id = %outcome.listing.target.id(),
                seats = outcome.booking.seats_booked,
                remaining,
                "Booking cancelled at confirmation: capacity exceeded"
            );
            return Err(AppError::CapacityExceeded {
                requested: outcome.booking.seats_booked,
                remaining,
            });
        }

        tracing::info!(
            booking_id = %booking_id,
            listing_id = %outcome.listing.target.id(),
            listing_status = %outcome.listing.status,
            "Booking confirmed"
        );
        Ok(outcome.booking)
    }

    pub async fn complete_booking(&self, actor: Uuid, booking_id: Uuid) -> Result<Booking, AppError> {
        let rule = move |listing: &Listing, booking: &Booking, _: &[Booking], retried: bool| {
            match retried.then(|| replayed_completion(listing, booking, actor)).flatten() {
                Some(change) => Ok(change),
                None => plan_complete_booking(listing, booking, actor),
            }
        };
        let outcome = self.transition("complete_booking", booking_id, rule).await?;

        tracing::info!(booking_id = %booking_id, "Booking completed");
        Ok(outcome.booking)
    }

    pub async fn cancel_booking(&self, actor: Uuid, booking_id: Uuid) -> Result<Booking, AppError> {
        let rule = move |listing: &Listing, booking: &Booking, _: &[Booking], retried: bool| {
            match retried.then(|| replayed_cancel(listing, booking, actor)).flatten() {
                Some(change) => Ok(change),
                None => plan_cancel(listing, booking, actor),
            }
        };
        let outcome = self.transition("cancel_booking", booking_id, rule).await?;

        tracing::info!(
            booking_id = %booking_id,
            user_id = %actor,
            reason = outcome.booking.status_reason.as_deref().unwrap_or_default(),
            "Booking cancelled"
        );
        Ok(outcome.booking)
    }

    /// Marks the listing completed. Its bookings keep their status.
    pub async fn complete_listing(
        &self,
        actor: Uuid,
        target: BookingTarget,
    ) -> Result<Listing, AppError> {
        let rule = move |listing: &Listing, retried: bool| {
            let replayed = ListingChange {
                status: ListingStatus::Completed,
                cancel_open_bookings: None,
            };
            match retried
                .then(|| replayed_listing_change(listing, actor, replayed))
                .flatten()
            {
                Some(change) => Ok(change),
                None => plan_listing_completion(listing, actor),
            }
        };
        let listing = self.listing_transition("complete_listing", target, rule).await?;

        tracing::info!(listing_id = %target.id(), kind = ?target.kind(), "Listing completed");
        Ok(listing)
    }

    /// Cancels the listing together with every open booking against it.
    pub async fn cancel_listing(
        &self,
        actor: Uuid,
        target: BookingTarget,
    ) -> Result<Listing, AppError> {
        let rule = move |listing: &Listing, retried: bool| {
            let replayed = ListingChange {
                status: ListingStatus::Cancelled,
                cancel_open_bookings: Some(REASON_LISTING_CANCELLED.to_string()),
            };
            match retried
                .then(|| replayed_listing_change(listing, actor, replayed))
                .flatten()
            {
                Some(change) => Ok(change),
                None => plan_listing_cancellation(listing, actor),
            }
        };
        let listing = self.listing_transition("cancel_listing", target, rule).await?;

        tracing::info!(listing_id = %target.id(), kind = ?target.kind(), "Listing cancelled");
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        ledger::fixtures::{
            ACK_STALL, booking, booking_by, impatient_retry, request_listing, ride_listing,
        },
        models::{
            profile::NewProfile,
            ride::NewRide,
        },
        store::{MemoryStore, SlowAckStore, Store},
        utils::retry::RetryPolicy,
    };

    #[test]
    fn test_transition_table() {
        use BookingStatus::*;

        assert!(can_transition_to(Pending, Confirmed));
        assert!(can_transition_to(Pending, Cancelled));
        assert!(can_transition_to(Confirmed, Completed));
        assert!(can_transition_to(Confirmed, Cancelled));

        assert!(!can_transition_to(Pending, Completed));
        assert!(!can_transition_to(Completed, Cancelled));
        assert!(!can_transition_to(Cancelled, Confirmed));
        assert!(!can_transition_to(Confirmed, Pending));
    }

    #[test]
    fn test_booking_snapshots_price() {
        let driver = Uuid::new_v4();
        let passenger = Uuid::new_v4();
        let listing = ride_listing(driver, 4, 20);

        let new = plan_booking(&listing, &[], passenger, 2, None).unwrap();
        assert_eq!(new.total_price, 40);
        assert_eq!(new.passenger_id, passenger);
        assert_eq!(new.driver_id, driver);
        assert_eq!(new.booked_by, passenger);
    }

    #[test]
    fn test_request_booking_assigns_roles() {
        let passenger = Uuid::new_v4();
        let driver = Uuid::new_v4();
        let listing = request_listing(passenger, 2, 15);

        let new = plan_booking(&listing, &[], driver, 2, None).unwrap();
        assert_eq!(new.passenger_id, passenger);
        assert_eq!(new.driver_id, driver);
        assert_eq!(new.booked_by, driver);
    }

    #[test]
    fn test_booking_rule_order() {
        let owner = Uuid::new_v4();
        let mut listing = ride_listing(owner, 2, 20);

        let err = plan_booking(&listing, &[], Uuid::new_v4(), 0, None).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = plan_booking(&listing, &[], owner, 1, None).unwrap_err();
        assert!(matches!(err, AppError::SelfBookingDenied));

        let err = plan_booking(&listing, &[], Uuid::new_v4(), 3, None).unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded {
                requested: 3,
                remaining: 2
            }
        ));

        listing.status = ListingStatus::Completed;
        let err = plan_booking(&listing, &[], Uuid::new_v4(), 1, None).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_capacity_counts_pending_bookings() {
        let listing = ride_listing(Uuid::new_v4(), 3, 20);
        let bookings = vec![booking(&listing, 2, BookingStatus::Pending)];

        let err = plan_booking(&listing, &bookings, Uuid::new_v4(), 2, None).unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded {
                requested: 2,
                remaining: 1
            }
        ));
        assert!(plan_booking(&listing, &bookings, Uuid::new_v4(), 1, None).is_ok());
    }

    #[test]
    fn test_only_owner_confirms() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 3, 20);
        let pending = booking(&listing, 1, BookingStatus::Pending);

        let err = plan_confirm(&listing, &pending, &[pending.clone()], pending.booked_by)
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let change = plan_confirm(&listing, &pending, &[pending.clone()], owner).unwrap();
        assert_eq!(change.status, BookingStatus::Confirmed);
        assert_eq!(change.listing_status, None);
    }

    #[test]
    fn test_confirm_over_capacity_cancels() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 2, 20);
        let confirmed = booking(&listing, 2, BookingStatus::Confirmed);
        let pending = booking(&listing, 1, BookingStatus::Pending);

        let change =
            plan_confirm(&listing, &pending, &[confirmed, pending.clone()], owner).unwrap();
        assert_eq!(change.status, BookingStatus::Cancelled);
        assert_eq!(change.reason.as_deref(), Some(REASON_CAPACITY_AT_CONFIRMATION));
    }

    #[test]
    fn test_full_request_becomes_booked_and_reopens_on_cancel() {
        let passenger = Uuid::new_v4();
        let mut listing = request_listing(passenger, 2, 15);
        let pending = booking(&listing, 2, BookingStatus::Pending);

        let change = plan_confirm(&listing, &pending, &[pending.clone()], passenger).unwrap();
        assert_eq!(change.listing_status, Some(ListingStatus::Booked));

        listing.status = ListingStatus::Booked;
        let mut confirmed = pending.clone();
        confirmed.status = BookingStatus::Confirmed;

        let change = plan_cancel(&listing, &confirmed, confirmed.booked_by).unwrap();
        assert_eq!(change.status, BookingStatus::Cancelled);
        assert_eq!(change.reason.as_deref(), Some(REASON_CANCELLED_BY_BOOKER));
        assert_eq!(change.listing_status, Some(ListingStatus::Active));
    }

    #[test]
    fn test_cancel_permissions_and_terminal_states() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 3, 20);
        let pending = booking(&listing, 1, BookingStatus::Pending);

        let err = plan_cancel(&listing, &pending, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let change = plan_cancel(&listing, &pending, owner).unwrap();
        assert_eq!(change.reason.as_deref(), Some(REASON_CANCELLED_BY_OWNER));

        let completed = booking(&listing, 1, BookingStatus::Completed);
        let err = plan_cancel(&listing, &completed, owner).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_requires_confirmed() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 3, 20);
        let pending = booking(&listing, 1, BookingStatus::Pending);
        let confirmed = booking(&listing, 1, BookingStatus::Confirmed);

        assert!(matches!(
            plan_complete_booking(&listing, &pending, owner).unwrap_err(),
            AppError::InvalidTransition { .. }
        ));
        assert_eq!(
            plan_complete_booking(&listing, &confirmed, owner).unwrap().status,
            BookingStatus::Completed
        );
    }

    #[test]
    fn test_listing_lifecycle_rules() {
        let owner = Uuid::new_v4();
        let mut listing = ride_listing(owner, 3, 20);

        assert!(matches!(
            plan_listing_completion(&listing, Uuid::new_v4()).unwrap_err(),
            AppError::Unauthorized(_)
        ));

        let change = plan_listing_cancellation(&listing, owner).unwrap();
        assert_eq!(change.status, ListingStatus::Cancelled);
        assert_eq!(change.cancel_open_bookings.as_deref(), Some(REASON_LISTING_CANCELLED));

        listing.status = ListingStatus::Cancelled;
        assert!(matches!(
            plan_listing_completion(&listing, owner).unwrap_err(),
            AppError::InvalidTransition { .. }
        ));
    }

    #[test]
    fn test_replay_recognises_only_the_actors_own_change() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 4, 20);

        let confirmed = booking(&listing, 1, BookingStatus::Confirmed);
        assert!(replayed_confirm(&listing, &confirmed, owner).is_some());
        assert!(replayed_confirm(&listing, &confirmed, confirmed.booked_by).is_none());
        assert!(replayed_completion(&listing, &confirmed, owner).is_none());

        let mut cancelled = booking(&listing, 1, BookingStatus::Cancelled);
        cancelled.status_reason = Some(REASON_CANCELLED_BY_BOOKER.to_string());
        assert!(replayed_cancel(&listing, &cancelled, cancelled.booked_by).is_some());
        assert!(replayed_cancel(&listing, &cancelled, owner).is_none());
        assert!(replayed_cancel(&listing, &cancelled, Uuid::new_v4()).is_none());
        assert!(replayed_confirm(&listing, &cancelled, owner).is_none());

        cancelled.status_reason = Some(REASON_CAPACITY_AT_CONFIRMATION.to_string());
        let change = replayed_confirm(&listing, &cancelled, owner).unwrap();
        assert_eq!(change.status, BookingStatus::Cancelled);
        assert_eq!(change.listing_status, None);

        let cancel = || ListingChange {
            status: ListingStatus::Cancelled,
            cancel_open_bookings: Some(REASON_LISTING_CANCELLED.to_string()),
        };
        assert!(replayed_listing_change(&listing, owner, cancel()).is_none());

        let cancelled_listing = Listing {
            status: ListingStatus::Cancelled,
            ..listing.clone()
        };
        assert!(replayed_listing_change(&cancelled_listing, owner, cancel()).is_some());
        assert!(replayed_listing_change(&cancelled_listing, Uuid::new_v4(), cancel()).is_none());
    }

    async fn seeded_ride(store: &dyn Store, seats: i32, price: i64) -> (Uuid, BookingTarget) {
        let driver = store
            .upsert_profile(NewProfile {
                external_id: format!("driver-{}", Uuid::new_v4()),
                full_name: "Driver".into(),
                email: None,
            })
            .await
            .unwrap();
        let ride = store
            .insert_ride(NewRide {
                driver_id: driver.id,
                from_location: "North Campus".into(),
                to_location: "Airport".into(),
                departure_time: chrono::Utc::now() + chrono::Duration::hours(2),
                available_seats: seats,
                price_per_seat: price,
                description: None,
            })
            .await
            .unwrap();
        (driver.id, BookingTarget::Ride(ride.id))
    }

    fn ledger(store: Arc<MemoryStore>) -> Ledger {
        Ledger::new(store, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_idempotent_retry_does_not_double_reserve() {
        let store = Arc::new(MemoryStore::new());
        let (_, target) = seeded_ride(&*store, 3, 20).await;
        let ledger = ledger(store.clone());
        let passenger = Uuid::new_v4();
        let key = Some(Uuid::new_v4());

        let first = ledger.create_booking(passenger, target, 2, key).await.unwrap();
        let second = ledger.create_booking(passenger, target, 2, key).await.unwrap();

        assert_eq!(first.id, second.id);
        let bookings = store.bookings_for_target(target).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(availability::remaining_seats(3, &bookings).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_price_change_leaves_total_untouched() {
        let store = Arc::new(MemoryStore::new());
        let (_, target) = seeded_ride(&*store, 4, 20).await;
        let ledger = ledger(store.clone());

        let booking = ledger
            .create_booking(Uuid::new_v4(), target, 2, None)
            .await
            .unwrap();
        assert_eq!(booking.total_price, 40);

        store
            .update_ride(
                target.id(),
                &crate::models::listing::ListingChanges {
                    price_per_seat: Some(35),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stored = store.booking(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.total_price, 40);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bookings_never_oversell() {
        let store = Arc::new(MemoryStore::new());
        let capacity = 3;
        let attempts = 10;
        let (_, target) = seeded_ride(&*store, capacity, 20).await;
        let ledger = ledger(store.clone());

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger.create_booking(Uuid::new_v4(), target, 1, None).await
                })
            })
            .collect();

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(AppError::CapacityExceeded { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(succeeded, capacity);
        assert_eq!(rejected, attempts - capacity);

        let bookings = store.bookings_for_target(target).await.unwrap();
        assert_eq!(availability::remaining_seats(capacity, &bookings).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_listing_cancels_open_bookings() {
        let store = Arc::new(MemoryStore::new());
        let (driver, target) = seeded_ride(&*store, 4, 20).await;
        let ledger = ledger(store.clone());

        let pending = ledger.create_booking(Uuid::new_v4(), target, 1, None).await.unwrap();
        let confirmed = ledger.create_booking(Uuid::new_v4(), target, 1, None).await.unwrap();
        ledger.confirm_booking(driver, confirmed.id).await.unwrap();

        let listing = ledger.cancel_listing(driver, target).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Cancelled);

        for id in [pending.id, confirmed.id] {
            let booking = store.booking(id).await.unwrap().unwrap();
            assert_eq!(booking.status, BookingStatus::Cancelled);
            assert_eq!(booking.status_reason.as_deref(), Some(REASON_LISTING_CANCELLED));
        }

        let err = ledger
            .create_booking(Uuid::new_v4(), target, 1, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_confirm_after_overbooking_reports_capacity() {
        let store = Arc::new(MemoryStore::new());
        let (driver, target) = seeded_ride(&*store, 2, 20).await;
        let ledger = ledger(store.clone());

        let first = ledger.create_booking(Uuid::new_v4(), target, 2, None).await.unwrap();
        ledger.confirm_booking(driver, first.id).await.unwrap();

        // Bypass the creation rule to simulate a pending booking that no
        // longer fits.
        let listing = store.listing(target).await.unwrap().unwrap();
        let stray = booking_by(&listing, Uuid::new_v4(), 1, BookingStatus::Pending);
        let forced = store
            .create_booking(target, stray.booked_by, None, &|l: &Listing, _: &[Booking]| {
                Ok(NewBooking {
                    target: l.target,
                    passenger_id: stray.passenger_id,
                    driver_id: stray.driver_id,
                    booked_by: stray.booked_by,
                    seats_booked: 1,
                    total_price: 20,
                    idempotency_key: None,
                })
            })
            .await
            .unwrap();

        let err = ledger.confirm_booking(driver, forced.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::CapacityExceeded {
                requested: 1,
                remaining: 0
            }
        ));

        let stored = store.booking(forced.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.status_reason.as_deref(), Some(REASON_CAPACITY_AT_CONFIRMATION));
    }

    #[tokio::test]
    async fn test_reused_key_for_different_booking_conflicts() {
        let store = Arc::new(MemoryStore::new());
        let (_, target) = seeded_ride(&*store, 4, 20).await;
        let (_, other_target) = seeded_ride(&*store, 4, 20).await;
        let ledger = ledger(store.clone());
        let passenger = Uuid::new_v4();
        let key = Some(Uuid::new_v4());

        ledger.create_booking(passenger, target, 1, key).await.unwrap();

        let err = ledger.create_booking(passenger, target, 2, key).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = ledger.create_booking(passenger, other_target, 1, key).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert_eq!(store.bookings_for_target(target).await.unwrap().len(), 1);
        assert!(store.bookings_for_target(other_target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_booking_is_reserved_once_when_reply_is_lost() {
        let store = Arc::new(SlowAckStore::new(ACK_STALL));
        let (_, target) = seeded_ride(&*store, 3, 20).await;
        let ledger = Ledger::new(store.clone(), impatient_retry());

        store.stall_next_write();
        let booking = ledger
            .create_booking(Uuid::new_v4(), target, 2, None)
            .await
            .unwrap();

        let bookings = store.bookings_for_target(target).await.unwrap();
        assert_eq!(bookings.len(), 1);
        assert_eq!(bookings[0].id, booking.id);
        assert_eq!(availability::remaining_seats(3, &bookings).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transitions_succeed_when_reply_is_lost() {
        let store = Arc::new(SlowAckStore::new(ACK_STALL));
        let (driver, target) = seeded_ride(&*store, 4, 20).await;
        let ledger = Ledger::new(store.clone(), impatient_retry());
        let passenger = Uuid::new_v4();

        let kept = ledger.create_booking(passenger, target, 1, None).await.unwrap();
        let dropped = ledger.create_booking(passenger, target, 1, None).await.unwrap();

        store.stall_next_write();
        let confirmed = ledger.confirm_booking(driver, kept.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        store.stall_next_write();
        let cancelled = ledger.cancel_booking(passenger, dropped.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.status_reason.as_deref(), Some(REASON_CANCELLED_BY_BOOKER));

        store.stall_next_write();
        let completed = ledger.complete_booking(driver, kept.id).await.unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        store.stall_next_write();
        let listing = ledger.cancel_listing(driver, target).await.unwrap();
        assert_eq!(listing.status, ListingStatus::Cancelled);

        // Completed bookings are not reopened or cancelled by the listing.
        let stored = store.booking(kept.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn test_repeated_confirm_outside_a_retry_is_invalid() {
        let store = Arc::new(SlowAckStore::new(ACK_STALL));
        let (driver, target) = seeded_ride(&*store, 4, 20).await;
        let ledger = Ledger::new(store.clone(), impatient_retry());
        let booking = ledger
            .create_booking(Uuid::new_v4(), target, 1, None)
            .await
            .unwrap();

        ledger.confirm_booking(driver, booking.id).await.unwrap();

        // Not a retry: a second confirmation is still invalid.
        let err = ledger.confirm_booking(driver, booking.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }
}
