// src/ledger/availability.rs

//! Remaining seats are never stored. They are derived from the listing's
//! capacity and the bookings that currently hold seats.

use crate::{
    error::AppError,
    models::{
        booking::{Booking, BookingStatus},
        listing::Listing,
    },
};

/// Whether a booking in `status` holds its seats.
/// A completed trip still occupies the seat it used.
pub fn occupies_seat(status: BookingStatus) -> bool {
    matches!(
        status,
        BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Completed
    )
}

pub fn booked_seats(bookings: &[Booking]) -> i32 {
    bookings
        .iter()
        .filter(|b| occupies_seat(b.status))
        .map(|b| b.seats_booked)
        .sum()
}

/// `capacity` minus the seats held by `bookings`.
///
/// More seats held than offered means the store was corrupted or a rule was
/// bypassed; that is reported as `AppError::Consistency`, never clamped.
pub fn remaining_seats(capacity: i32, bookings: &[Booking]) -> Result<i32, AppError> {
    let booked = booked_seats(bookings);
    let remaining = capacity - booked;

    if remaining < 0 {
        tracing::error!(capacity, booked, "Bookings exceed listing capacity");
        return Err(AppError::Consistency(format!(
            "{} seats booked against a capacity of {}",
            booked, capacity
        )));
    }

    Ok(remaining)
}

/// Remaining seats of `listing`, ignoring bookings that target anything else.
pub fn remaining_for(listing: &Listing, bookings: &[Booking]) -> Result<i32, AppError> {
    let own: Vec<Booking> = bookings
        .iter()
        .filter(|b| b.targets(&listing.target))
        .cloned()
        .collect();

    remaining_seats(listing.capacity, &own).inspect_err(|_| {
        tracing::error!(listing_id = %listing.target.id(), "Availability check failed");
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::ledger::fixtures::{booking, ride_listing};

    #[test]
    fn test_full_capacity_without_bookings() {
        assert_eq!(remaining_seats(4, &[]).unwrap(), 4);
    }

    #[test]
    fn test_cancelled_bookings_release_seats() {
        let listing = ride_listing(Uuid::new_v4(), 4, 20);
        let bookings = vec![
            booking(&listing, 2, BookingStatus::Pending),
            booking(&listing, 1, BookingStatus::Cancelled),
        ];

        assert_eq!(remaining_seats(4, &bookings).unwrap(), 2);
    }

    #[test]
    fn test_completed_bookings_still_occupy() {
        let listing = ride_listing(Uuid::new_v4(), 3, 20);
        let bookings = vec![
            booking(&listing, 1, BookingStatus::Completed),
            booking(&listing, 1, BookingStatus::Confirmed),
        ];

        assert_eq!(booked_seats(&bookings), 2);
        assert_eq!(remaining_seats(3, &bookings).unwrap(), 1);
    }

    #[test]
    fn test_overbooking_is_a_consistency_error() {
        let listing = ride_listing(Uuid::new_v4(), 2, 20);
        let bookings = vec![booking(&listing, 3, BookingStatus::Confirmed)];

        let err = remaining_seats(2, &bookings).unwrap_err();
        assert!(matches!(err, AppError::Consistency(_)));
    }

    #[test]
    fn test_remaining_for_ignores_other_listings() {
        let owner = Uuid::new_v4();
        let listing = ride_listing(owner, 4, 20);
        let other = ride_listing(owner, 4, 20);
        let bookings = vec![
            booking(&listing, 1, BookingStatus::Pending),
            booking(&other, 3, BookingStatus::Confirmed),
        ];

        assert_eq!(remaining_for(&listing, &bookings).unwrap(), 3);
        assert_eq!(remaining_for(&other, &bookings).unwrap(), 1);
    }
}
