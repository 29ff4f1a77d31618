// src/handlers/mod.rs

use chrono::{DateTime, Utc};

use crate::{
    config::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, MAX_SEATS_PER_LISTING},
    error::AppError,
    models::listing::{ListingChanges, ListingFilter, ListingListParams, ListingStatus},
    utils::html::clean_optional,
};

pub mod auth;
pub mod bookings;
pub mod dashboard;
pub mod profile;
pub mod ratings;
pub mod ride_requests;
pub mod rides;
pub mod wallet;

/// Clamps a requested page size to `1..=MAX_PAGE_LIMIT`.
pub(crate) fn page_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
}

pub(crate) fn validate_seats(seats: i32) -> Result<(), AppError> {
    if !(1..=MAX_SEATS_PER_LISTING).contains(&seats) {
        return Err(AppError::Validation(format!(
            "Seats must be between 1 and {}",
            MAX_SEATS_PER_LISTING
        )));
    }
    Ok(())
}

pub(crate) fn validate_price(price_per_seat: i64) -> Result<(), AppError> {
    if price_per_seat < 0 {
        return Err(AppError::Validation("Price per seat cannot be negative".to_string()));
    }
    Ok(())
}

pub(crate) fn validate_departure(departure: DateTime<Utc>) -> Result<(), AppError> {
    if departure <= Utc::now() {
        return Err(AppError::Validation("Departure time must be in the future".to_string()));
    }
    Ok(())
}

/// Builds a store filter from query parameters. `status` defaults to
/// `active`; `all` lifts the filter.
pub(crate) fn listing_filter(params: ListingListParams) -> Result<ListingFilter, AppError> {
    let status = match params.status.as_deref() {
        None => Some(ListingStatus::Active),
        Some("all") => None,
        Some(raw) => Some(
            raw.parse::<ListingStatus>()
                .map_err(|e| AppError::Validation(e.to_string()))?,
        ),
    };

    Ok(ListingFilter {
        status,
        owner_id: params.owner_id,
        q: params
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
        limit: page_limit(params.limit),
    })
}

/// Validates and sanitizes owner edits to a listing.
pub(crate) fn listing_changes(
    price_per_seat: Option<i64>,
    description: Option<&str>,
    departure_time: Option<DateTime<Utc>>,
) -> Result<ListingChanges, AppError> {
    if let Some(price) = price_per_seat {
        validate_price(price)?;
    }
    if let Some(departure) = departure_time {
        validate_departure(departure)?;
    }

    let changes = ListingChanges {
        price_per_seat,
        description: clean_optional(description),
        departure_time,
    };
    if changes.is_empty() {
        return Err(AppError::Validation("Nothing to update".to_string()));
    }

    Ok(changes)
}
