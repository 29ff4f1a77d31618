// src/handlers/dashboard.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::{NaiveTime, Utc};

use crate::{error::AppError, ledger::Ledger};

/// Platform counters. `daily_rides` counts rides published since midnight UTC.
pub async fn stats(State(ledger): State<Ledger>) -> Result<impl IntoResponse, AppError> {
    let since = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();

    let stats = ledger
        .query("dashboard_stats", |store| store.dashboard_stats(since))
        .await
        .inspect_err(|e| tracing::error!("Failed to load dashboard stats: {:?}", e))?;

    Ok(Json(stats))
}
