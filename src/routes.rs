// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, bookings, dashboard, profile, ratings, ride_requests, rides, wallet},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Every `/api` route requires a bearer token.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (ledger + config).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new().route("/sync", post(auth::sync));

    let profile_routes = Router::new()
        .route("/me", get(profile::get_me).put(profile::update_me))
        .route("/me/stats", get(profile::my_stats));

    let profiles_routes = Router::new()
        .route("/{id}", get(profile::get_profile))
        .route("/{id}/ratings", get(ratings::list_for_profile));

    let ride_routes = Router::new()
        .route("/", get(rides::list_rides).post(rides::create_ride))
        .route("/{id}", get(rides::get_ride).put(rides::update_ride))
        .route("/{id}/complete", post(rides::complete_ride))
        .route("/{id}/cancel", post(rides::cancel_ride));

    let ride_request_routes = Router::new()
        .route(
            "/",
            get(ride_requests::list_requests).post(ride_requests::create_request),
        )
        .route(
            "/{id}",
            get(ride_requests::get_request).put(ride_requests::update_request),
        )
        .route("/{id}/complete", post(ride_requests::complete_request))
        .route("/{id}/cancel", post(ride_requests::cancel_request));

    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking))
        .route("/me", get(bookings::my_bookings))
        .route("/{id}", get(bookings::get_booking))
        .route("/{id}/confirm", post(bookings::confirm_booking))
        .route("/{id}/complete", post(bookings::complete_booking))
        .route("/{id}/cancel", post(bookings::cancel_booking));

    let rating_routes = Router::new().route("/", post(ratings::create_rating));

    let wallet_routes = Router::new()
        .route("/", get(wallet::get_wallet))
        .route("/transactions", get(wallet::list_transactions))
        .route("/credit", post(wallet::credit))
        .route("/debit", post(wallet::debit))
        .route("/reconcile", get(wallet::reconcile));

    let dashboard_routes = Router::new().route("/stats", get(dashboard::stats));

    let api = Router::new()
        .nest("/auth", auth_routes)
        .nest("/profile", profile_routes)
        .nest("/profiles", profiles_routes)
        .nest("/rides", ride_routes)
        .nest("/ride-requests", ride_request_routes)
        .nest("/bookings", booking_routes)
        .nest("/ratings", rating_routes)
        .nest("/wallet", wallet_routes)
        .nest("/dashboard", dashboard_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api", api)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
