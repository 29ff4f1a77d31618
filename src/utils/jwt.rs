// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{config::Config, error::AppError, state::AppState};

/// JWT claims issued by the identity provider.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject: the identity provider's user id.
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// Signs an HS256 token. Production tokens come from the identity provider;
/// this is for local development and tests.
pub fn sign_jwt(
    sub: &str,
    name: Option<&str>,
    email: Option<&str>,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .as_secs()
        + expiration_seconds;

    let claims = Claims {
        sub: sub.to_owned(),
        name: name.map(str::to_owned),
        email: email.map(str::to_owned),
        exp: expiration as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthenticated("Invalid or expired token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates `Authorization: Bearer <token>` and injects `Claims` into the
/// request extensions.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;

    let claims = verify_jwt(token, &config.jwt_secret)?;
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// The caller, resolved from the token subject to the internal profile id.
///
/// Requires `auth_middleware` upstream. Identities that never called
/// `POST /api/auth/sync` have no profile and are refused.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub claims: Claims,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("Missing credentials".to_string()))?;

        let sub = claims.sub.as_str();
        let profile = state
            .ledger
            .query("profile_by_external_id", |store| store.profile_by_external_id(sub))
            .await?
            .ok_or_else(|| {
                AppError::Unauthorized(
                    "No profile for this identity. Call POST /api/auth/sync first".to_string(),
                )
            })?;

        Ok(CurrentUser {
            id: profile.id,
            claims,
        })
    }
}
