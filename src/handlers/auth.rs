// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, response::IntoResponse};

use crate::{
    error::AppError,
    ledger::Ledger,
    models::profile::NewProfile,
    utils::{html::clean_html, jwt::Claims},
};

const FALLBACK_NAME: &str = "Campus rider";

/// Display name from the claims: `name`, else the email's local part.
fn display_name(claims: &Claims) -> String {
    let name = claims
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| {
            claims
                .email
                .as_deref()
                .and_then(|email| email.split('@').next())
                .filter(|local| !local.is_empty())
        })
        .unwrap_or(FALLBACK_NAME);

    let cleaned: String = clean_html(name).chars().take(100).collect();
    if cleaned.trim().is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// Creates the caller's profile on first sign-in; afterwards returns it.
/// Safe to call on every sign-in.
pub async fn sync(
    State(ledger): State<Ledger>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let new = NewProfile {
        external_id: claims.sub.clone(),
        full_name: display_name(&claims),
        email: claims.email.clone(),
    };

    let profile = ledger
        .query("upsert_profile", |store| store.upsert_profile(new.clone()))
        .await
        .inspect_err(|e| tracing::error!("Failed to sync profile: {:?}", e))?;

    tracing::info!(user_id = %profile.id, "Profile synced");
    Ok(Json(profile))
}
