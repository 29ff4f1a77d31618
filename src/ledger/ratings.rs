// src/ledger/ratings.rs

use uuid::Uuid;

use super::Ledger;
use crate::{
    error::AppError,
    models::{
        booking::{Booking, BookingStatus},
        listing::{BookingTarget, Listing, ListingStatus},
        rating::{NewRating, Rating, RatingSummary, RatingWithRater},
    },
    utils::retry::with_retry,
};

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

pub fn validate_score(score: i32) -> Result<(), AppError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(AppError::InvalidScore(score));
    }
    Ok(())
}

/// Rater and rated must be the listing owner and one of its bookers, in
/// either order, and the trip must be over. Only a booking the owner
/// confirmed counts; a pending one was never accepted onto the trip.
pub fn check_eligibility(
    listing: &Listing,
    bookings: &[Booking],
    rater: Uuid,
    rated: Uuid,
) -> Result<(), AppError> {
    if listing.status != ListingStatus::Completed {
        return Err(AppError::Unauthorized(
            "Ratings are only accepted once the trip is completed".to_string(),
        ));
    }

    let booked = |user: Uuid| {
        bookings
            .iter()
            .any(|b| {
                b.booked_by == user
                    && matches!(b.status, BookingStatus::Confirmed | BookingStatus::Completed)
            })
    };
    let owner = listing.owner_id;

    if (rater == owner && booked(rated)) || (rated == owner && booked(rater)) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "Only participants of this trip can rate each other".to_string(),
        ))
    }
}

/// Mean of `scores` rounded to one decimal, `None` when there are none.
pub fn summarize(scores: &[i32]) -> RatingSummary {
    if scores.is_empty() {
        return RatingSummary {
            average: None,
            count: 0,
        };
    }

    let total: i64 = scores.iter().map(|&s| s as i64).sum();
    let mean = total as f64 / scores.len() as f64;

    RatingSummary {
        average: Some((mean * 10.0).round() / 10.0),
        count: scores.len(),
    }
}

impl Ledger {
    pub async fn record_rating(
        &self,
        rater: Uuid,
        rated: Uuid,
        trip: BookingTarget,
        score: i32,
        comment: Option<String>,
    ) -> Result<Rating, AppError> {
        validate_score(score)?;
        if rater == rated {
            return Err(AppError::SelfRatingDenied);
        }

        let listing = self
            .query("listing", |store| store.listing(trip))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} not found", trip.label())))?;
        let bookings = self
            .query("bookings_for_target", |store| store.bookings_for_target(trip))
            .await?;
        check_eligibility(&listing, &bookings, rater, rated)?;

        let new = NewRating {
            rater_id: rater,
            rated_id: rated,
            target: trip,
            rating: score,
            comment,
        };
        let store = self.store();

        let rating = with_retry(&self.retry, "insert_rating", || store.insert_rating(new.clone()))
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::DuplicateRating,
                other => other,
            })?;

        tracing::info!(
            rating_id = %rating.id,
            rater_id = %rater,
            rated_id = %rated,
            listing_id = %trip.id(),
            score,
            "Rating recorded"
        );
        Ok(rating)
    }

    pub async fn average_rating(&self, user: Uuid) -> Result<RatingSummary, AppError> {
        let (_, summary) = self.ratings_with_summary(user).await?;
        Ok(summary)
    }

    /// Ratings received by `user`, newest first, with their summary.
    pub async fn ratings_with_summary(
        &self,
        user: Uuid,
    ) -> Result<(Vec<RatingWithRater>, RatingSummary), AppError> {
        let ratings = self.ratings_for(user).await?;
        let scores: Vec<i32> = ratings.iter().map(|r| r.rating.rating).collect();
        let summary = summarize(&scores);
        Ok((ratings, summary))
    }

    /// Ratings received by `user`, newest first.
    pub async fn ratings_for(&self, user: Uuid) -> Result<Vec<RatingWithRater>, AppError> {
        self.query("ratings_for_user", |store| store.ratings_for_user(user))
            .await
    }
}
