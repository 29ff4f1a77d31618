// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    BookingRule, ListingRule, Store, TransitionOutcome, TransitionRule, WalletRule,
    WalletSnapshot,
};
use crate::{
    error::AppError,
    models::{
        booking::Booking,
        listing::{BookingTarget, Listing, ListingChanges, ListingFilter, ListingStatus},
        profile::{NewProfile, Profile, UpdateProfileRequest},
        rating::{NewRating, Rating, RatingWithRater},
        ride::{NewRide, Ride},
        ride_request::{NewRideRequest, RideRequest},
        stats::{DashboardStats, UserStats},
        wallet::{TransactionStatus, UserWallet, WalletTransaction},
    },
};

const PROFILE_COLUMNS: &str = "id, external_id, full_name, email, college, phone, bio, \
     avatar_url, verification_status, created_at, updated_at";

const RIDE_COLUMNS: &str = "id, driver_id, from_location, to_location, departure_time, \
     available_seats, price_per_seat, description, status, created_at, updated_at";

const RIDE_REQUEST_COLUMNS: &str = "id, passenger_id, from_location, to_location, \
     preferred_departure_time, requested_seats, price_per_seat, description, status, \
     created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, ride_id, ride_request_id, passenger_id, driver_id, \
     booked_by, seats_booked, total_price, status, status_reason, idempotency_key, \
     created_at, updated_at";

const RATING_COLUMNS: &str =
    "id, rater_id, rated_id, ride_id, ride_request_id, rating, comment, created_at";

const TRANSACTION_COLUMNS: &str = "id, user_id, operation_id, booking_id, amount, \
     transaction_type, description, status, created_at";

/// Postgres-backed store. Rule-driven writes run in a transaction that
/// locks the listing row first, then booking rows (or the wallet row).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn listing_not_found(target: BookingTarget) -> AppError {
    AppError::NotFound(format!("{} not found", target.label()))
}

/// Column on `bookings` / `ratings` that references the target.
fn target_column(target: BookingTarget) -> &'static str {
    match target {
        BookingTarget::Ride(_) => "ride_id",
        BookingTarget::RideRequest(_) => "ride_request_id",
    }
}

/// Escapes LIKE metacharacters so `q` matches as a plain substring.
fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

async fn fetch_listing(
    conn: &mut PgConnection,
    target: BookingTarget,
    lock: bool,
) -> Result<Option<Listing>, AppError> {
    let suffix = if lock { " FOR UPDATE" } else { "" };

    let listing = match target {
        BookingTarget::Ride(id) => sqlx::query_as::<_, Ride>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1{suffix}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|ride| Listing::from(&ride)),
        BookingTarget::RideRequest(id) => sqlx::query_as::<_, RideRequest>(&format!(
            "SELECT {RIDE_REQUEST_COLUMNS} FROM ride_requests WHERE id = $1{suffix}"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|request| Listing::from(&request)),
    };

    Ok(listing)
}

async fn fetch_bookings(
    conn: &mut PgConnection,
    target: BookingTarget,
) -> Result<Vec<Booking>, AppError> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE {} = $1 ORDER BY created_at",
        target_column(target)
    ))
    .bind(target.id())
    .fetch_all(&mut *conn)
    .await?;

    Ok(bookings)
}

async fn set_listing_status(
    conn: &mut PgConnection,
    target: BookingTarget,
    status: ListingStatus,
) -> Result<(), AppError> {
    let table = match target {
        BookingTarget::Ride(_) => "rides",
        BookingTarget::RideRequest(_) => "ride_requests",
    };

    sqlx::query(&format!(
        "UPDATE {table} SET status = $2, updated_at = NOW() WHERE id = $1"
    ))
    .bind(target.id())
    .bind(status.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_profile(&self, new: NewProfile) -> Result<Profile, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            r#"
            INSERT INTO profiles (id, external_id, full_name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (external_id) DO UPDATE SET
                email = COALESCE(profiles.email, EXCLUDED.email),
                updated_at = CASE
                    WHEN profiles.email IS NULL AND EXCLUDED.email IS NOT NULL THEN NOW()
                    ELSE profiles.updated_at
                END
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.external_id)
        .bind(&new.full_name)
        .bind(&new.email)
        .fetch_one(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn profile_by_external_id(&self, external_id: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE external_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: &UpdateProfileRequest,
    ) -> Result<Profile, AppError> {
        sqlx::query_as::<_, Profile>(&format!(
            r#"
            UPDATE profiles SET
                full_name = COALESCE($2, full_name),
                college = COALESCE($3, college),
                phone = COALESCE($4, phone),
                bio = COALESCE($5, bio),
                avatar_url = COALESCE($6, avatar_url),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PROFILE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.full_name)
        .bind(&changes.college)
        .bind(&changes.phone)
        .bind(&changes.bio)
        .bind(&changes.avatar_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
    }

    async fn insert_ride(&self, new: NewRide) -> Result<Ride, AppError> {
        let ride = sqlx::query_as::<_, Ride>(&format!(
            r#"
            INSERT INTO rides (id, driver_id, from_location, to_location, departure_time,
                               available_seats, price_per_seat, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.driver_id)
        .bind(&new.from_location)
        .bind(&new.to_location)
        .bind(new.departure_time)
        .bind(new.available_seats)
        .bind(new.price_per_seat)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn ride(&self, id: Uuid) -> Result<Option<Ride>, AppError> {
        let ride = sqlx::query_as::<_, Ride>(&format!(
            "SELECT {RIDE_COLUMNS} FROM rides WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ride)
    }

    async fn list_rides(&self, filter: &ListingFilter) -> Result<Vec<Ride>, AppError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {RIDE_COLUMNS} FROM rides WHERE TRUE"));

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = filter.owner_id {
            qb.push(" AND driver_id = ").push_bind(owner_id);
        }
        if let Some(q) = &filter.q {
            let pattern = like_pattern(q);
            qb.push(" AND (from_location ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR to_location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY departure_time ASC LIMIT ")
            .push_bind(filter.limit);

        let rides = qb.build_query_as::<Ride>().fetch_all(&self.pool).await?;
        Ok(rides)
    }

    async fn update_ride(&self, id: Uuid, changes: &ListingChanges) -> Result<Ride, AppError> {
        sqlx::query_as::<_, Ride>(&format!(
            r#"
            UPDATE rides SET
                price_per_seat = COALESCE($2, price_per_seat),
                description = COALESCE($3, description),
                departure_time = COALESCE($4, departure_time),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RIDE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.price_per_seat)
        .bind(&changes.description)
        .bind(changes.departure_time)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
    }

    async fn insert_ride_request(&self, new: NewRideRequest) -> Result<RideRequest, AppError> {
        let request = sqlx::query_as::<_, RideRequest>(&format!(
            r#"
            INSERT INTO ride_requests (id, passenger_id, from_location, to_location,
                                       preferred_departure_time, requested_seats,
                                       price_per_seat, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {RIDE_REQUEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.passenger_id)
        .bind(&new.from_location)
        .bind(&new.to_location)
        .bind(new.preferred_departure_time)
        .bind(new.requested_seats)
        .bind(new.price_per_seat)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(request)
    }

    async fn ride_request(&self, id: Uuid) -> Result<Option<RideRequest>, AppError> {
        let request = sqlx::query_as::<_, RideRequest>(&format!(
            "SELECT {RIDE_REQUEST_COLUMNS} FROM ride_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    async fn list_ride_requests(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<RideRequest>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {RIDE_REQUEST_COLUMNS} FROM ride_requests WHERE TRUE"
        ));

        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(owner_id) = filter.owner_id {
            qb.push(" AND passenger_id = ").push_bind(owner_id);
        }
        if let Some(q) = &filter.q {
            let pattern = like_pattern(q);
            qb.push(" AND (from_location ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR to_location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY preferred_departure_time ASC LIMIT ")
            .push_bind(filter.limit);

        let requests = qb
            .build_query_as::<RideRequest>()
            .fetch_all(&self.pool)
            .await?;
        Ok(requests)
    }

    async fn update_ride_request(
        &self,
        id: Uuid,
        changes: &ListingChanges,
    ) -> Result<RideRequest, AppError> {
        sqlx::query_as::<_, RideRequest>(&format!(
            r#"
            UPDATE ride_requests SET
                price_per_seat = COALESCE($2, price_per_seat),
                description = COALESCE($3, description),
                preferred_departure_time = COALESCE($4, preferred_departure_time),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RIDE_REQUEST_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.price_per_seat)
        .bind(&changes.description)
        .bind(changes.departure_time)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Ride request not found".to_string()))
    }

    async fn listing(&self, target: BookingTarget) -> Result<Option<Listing>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_listing(&mut conn, target, false).await
    }

    async fn transition_listing(
        &self,
        target: BookingTarget,
        rule: &ListingRule<'_>,
    ) -> Result<Listing, AppError> {
        let mut tx = self.pool.begin().await?;

        let listing = fetch_listing(&mut tx, target, true)
            .await?
            .ok_or_else(|| listing_not_found(target))?;
        let bookings = fetch_bookings(&mut tx, target).await?;

        let change = rule(&listing, &bookings)?;

        set_listing_status(&mut tx, target, change.status).await?;
        if let Some(reason) = &change.cancel_open_bookings {
            sqlx::query(&format!(
                r#"
                UPDATE bookings
                SET status = 'cancelled', status_reason = $2, updated_at = NOW()
                WHERE {} = $1 AND status IN ('pending', 'confirmed')
                "#,
                target_column(target)
            ))
            .bind(target.id())
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        }

        let listing = fetch_listing(&mut tx, target, false)
            .await?
            .ok_or_else(|| listing_not_found(target))?;

        tx.commit().await?;
        Ok(listing)
    }

    async fn create_booking(
        &self,
        target: BookingTarget,
        booked_by: Uuid,
        idempotency_key: Option<Uuid>,
        rule: &BookingRule<'_>,
    ) -> Result<Booking, AppError> {
        let mut tx = self.pool.begin().await?;

        // Concurrent requests for the same listing serialize here.
        let listing = fetch_listing(&mut tx, target, true)
            .await?
            .ok_or_else(|| listing_not_found(target))?;

        if let Some(key) = idempotency_key {
            let existing = sqlx::query_as::<_, Booking>(&format!(
                "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booked_by = $1 AND idempotency_key = $2"
            ))
            .bind(booked_by)
            .bind(key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                return Ok(existing);
            }
        }

        let bookings = fetch_bookings(&mut tx, target).await?;
        let new = rule(&listing, &bookings)?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            INSERT INTO bookings (id, ride_id, ride_request_id, passenger_id, driver_id,
                                  booked_by, seats_booked, total_price, status, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9)
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.target.ride_id())
        .bind(new.target.ride_request_id())
        .bind(new.passenger_id)
        .bind(new.driver_id)
        .bind(new.booked_by)
        .bind(new.seats_booked)
        .bind(new.total_price)
        .bind(new.idempotency_key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(booking)
    }

    async fn transition_booking(
        &self,
        booking_id: Uuid,
        rule: &TransitionRule<'_>,
    ) -> Result<TransitionOutcome, AppError> {
        let select_booking = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let mut tx = self.pool.begin().await?;

        let target = sqlx::query_as::<_, Booking>(&select_booking)
            .bind(booking_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Booking not found".to_string()))?
            .target()?;

        // Listing before booking, the same order create_booking uses.
        let listing = fetch_listing(&mut tx, target, true).await?.ok_or_else(|| {
            AppError::Consistency(format!("booking {} references a missing listing", booking_id))
        })?;
        let booking = sqlx::query_as::<_, Booking>(&format!("{select_booking} FOR UPDATE"))
            .bind(booking_id)
            .fetch_one(&mut *tx)
            .await?;
        let bookings = fetch_bookings(&mut tx, target).await?;

        let change = rule(&listing, &booking, &bookings)?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            r#"
            UPDATE bookings
            SET status = $2, status_reason = COALESCE($3, status_reason), updated_at = NOW()
            WHERE id = $1
            RETURNING {BOOKING_COLUMNS}
            "#
        ))
        .bind(booking_id)
        .bind(change.status.as_str())
        .bind(&change.reason)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(status) = change.listing_status {
            set_listing_status(&mut tx, target, status).await?;
        }

        let listing = fetch_listing(&mut tx, target, false)
            .await?
            .ok_or_else(|| listing_not_found(target))?;
        let bookings = fetch_bookings(&mut tx, target).await?;

        tx.commit().await?;
        Ok(TransitionOutcome {
            booking,
            listing,
            bookings,
        })
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn bookings_for_target(&self, target: BookingTarget) -> Result<Vec<Booking>, AppError> {
        let mut conn = self.pool.acquire().await?;
        fetch_bookings(&mut conn, target).await
    }

    async fn bookings_for_targets(
        &self,
        targets: &[BookingTarget],
    ) -> Result<Vec<Booking>, AppError> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let ride_ids: Vec<Uuid> = targets.iter().filter_map(|t| t.ride_id()).collect();
        let request_ids: Vec<Uuid> = targets.iter().filter_map(|t| t.ride_request_id()).collect();

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE ride_id = ANY($1) OR ride_request_id = ANY($2)
            ORDER BY created_at
            "#
        ))
        .bind(ride_ids)
        .bind(request_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            r#"
            SELECT {BOOKING_COLUMNS} FROM bookings
            WHERE passenger_id = $1 OR driver_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(bookings)
    }

    async fn insert_rating(&self, new: NewRating) -> Result<Rating, AppError> {
        let rating = sqlx::query_as::<_, Rating>(&format!(
            r#"
            INSERT INTO ratings (id, rater_id, rated_id, ride_id, ride_request_id, rating, comment)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {RATING_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.rater_id)
        .bind(new.rated_id)
        .bind(new.target.ride_id())
        .bind(new.target.ride_request_id())
        .bind(new.rating)
        .bind(&new.comment)
        .fetch_one(&self.pool)
        .await?;

        Ok(rating)
    }

    async fn ratings_for_user(&self, user_id: Uuid) -> Result<Vec<RatingWithRater>, AppError> {
        let ratings = sqlx::query_as::<_, RatingWithRater>(
            r#"
            SELECT r.id, r.rater_id, r.rated_id, r.ride_id, r.ride_request_id,
                   r.rating, r.comment, r.created_at,
                   COALESCE(p.full_name, '') AS rater_name
            FROM ratings r
            LEFT JOIN profiles p ON p.id = r.rater_id
            WHERE r.rated_id = $1
            ORDER BY r.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ratings)
    }

    async fn apply_wallet_entry(
        &self,
        user_id: Uuid,
        operation_id: Uuid,
        rule: &WalletRule<'_>,
    ) -> Result<(WalletTransaction, UserWallet), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO user_wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let wallet = sqlx::query_as::<_, UserWallet>(
            "SELECT user_id, balance, updated_at FROM user_wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        // Checked under the wallet lock, so a retry cannot race its first attempt.
        let existing = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions \
             WHERE user_id = $1 AND operation_id = $2"
        ))
        .bind(user_id)
        .bind(operation_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(existing) = existing {
            return Ok((existing, wallet));
        }

        let entry = rule(wallet.balance)?;
        let balance = wallet.balance.checked_add(entry.signed_amount()).ok_or_else(|| {
            AppError::Consistency(format!("wallet balance overflow for user {}", user_id))
        })?;

        let transaction = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            INSERT INTO wallet_transactions (id, user_id, operation_id, booking_id, amount,
                                             transaction_type, description, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {TRANSACTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(operation_id)
        .bind(entry.booking_id)
        .bind(entry.amount)
        .bind(entry.transaction_type.as_str())
        .bind(&entry.description)
        .bind(TransactionStatus::Completed.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let wallet = sqlx::query_as::<_, UserWallet>(
            r#"
            UPDATE user_wallets SET balance = $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING user_id, balance, updated_at
            "#,
        )
        .bind(user_id)
        .bind(balance)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((transaction, wallet))
    }

    async fn wallet(&self, user_id: Uuid) -> Result<Option<UserWallet>, AppError> {
        let wallet = sqlx::query_as::<_, UserWallet>(
            "SELECT user_id, balance, updated_at FROM user_wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    async fn wallet_transactions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletTransaction>, AppError> {
        let transactions = sqlx::query_as::<_, WalletTransaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn wallet_snapshot(&self, user_id: Uuid) -> Result<WalletSnapshot, AppError> {
        let mut tx = self.pool.begin().await?;

        // Writers lock the wallet row before appending, so holding a share
        // lock keeps row and history in step for the rest of the read.
        let wallet = sqlx::query_as::<_, UserWallet>(
            "SELECT user_id, balance, updated_at FROM user_wallets WHERE user_id = $1 FOR SHARE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let transactions = sqlx::query_as::<_, WalletTransaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(WalletSnapshot {
            wallet,
            transactions,
        })
    }

    async fn dashboard_stats(&self, since: DateTime<Utc>) -> Result<DashboardStats, AppError> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles) AS total_users,
                (SELECT COUNT(*) FROM bookings) AS total_bookings,
                (SELECT COUNT(*) FROM rides WHERE created_at >= $1) AS daily_rides,
                (SELECT COUNT(*) FROM rides WHERE status = 'active') AS total_active_rides,
                (SELECT COUNT(*) FROM rides) AS total_ride_offers,
                (SELECT COUNT(*) FROM ride_requests WHERE status = 'active') AS total_ride_requests,
                (SELECT COALESCE(SUM(total_price), 0)::BIGINT FROM bookings
                    WHERE status IN ('confirmed', 'completed')) AS total_revenue
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn user_stats(&self, user_id: Uuid) -> Result<UserStats, AppError> {
        let stats = sqlx::query_as::<_, UserStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM rides WHERE driver_id = $1) AS rides_offered,
                (SELECT COUNT(*) FROM ride_requests WHERE passenger_id = $1) AS rides_requested,
                (SELECT COUNT(*) FROM bookings WHERE passenger_id = $1) AS bookings_as_passenger,
                (SELECT COUNT(*) FROM bookings WHERE driver_id = $1) AS bookings_as_driver,
                (SELECT COUNT(*) FROM bookings
                    WHERE (passenger_id = $1 OR driver_id = $1) AND status = 'completed')
                    AS completed_trips,
                (SELECT COUNT(*) FROM bookings
                    WHERE (passenger_id = $1 OR driver_id = $1) AND status = 'cancelled')
                    AS cancelled_trips
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("north"), "%north%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_target_column() {
        let id = Uuid::new_v4();
        assert_eq!(target_column(BookingTarget::Ride(id)), "ride_id");
        assert_eq!(target_column(BookingTarget::RideRequest(id)), "ride_request_id");
    }
}
