// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use campus_rides::{
    config::Config,
    routes,
    state::AppState,
    store::{MemoryStore, Store},
    utils::jwt::sign_jwt,
};
use chrono::Utc;
use reqwest::{Response, StatusCode};
use serde_json::{Value, json};

pub const JWT_SECRET: &str = "test_secret_for_integration_tests";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

/// A synced user: internal profile id plus a bearer token.
pub struct TestUser {
    pub id: String,
    pub token: String,
}

pub fn test_config(database_url: Option<String>) -> Config {
    Config {
        database_url,
        jwt_secret: JWT_SECRET.to_string(),
        rust_log: "error".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:3000".to_string()],
        store_timeout: Duration::from_secs(3),
        store_retry_attempts: 3,
        store_retry_backoff: Duration::from_millis(10),
    }
}

/// Spawns the app on a random port over a fresh in-memory store.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(Arc::new(MemoryStore::new()), test_config(None)).await
}

pub async fn spawn_app_with(store: Arc<dyn Store>, config: Config) -> TestApp {
    let state = AppState::new(store, config);
    let app = routes::create_router(state);

    // Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    }
}

pub fn token_for(sub: &str) -> String {
    sign_jwt(
        sub,
        Some(sub),
        Some(&format!("{}@campus.edu", sub)),
        JWT_SECRET,
        600,
    )
    .unwrap()
}

pub fn in_hours(hours: i64) -> String {
    (Utc::now() + chrono::Duration::hours(hours)).to_rfc3339()
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, token: &str, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, token: &str, path: &str, body: Value) -> Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Signs in a new identity and syncs its profile.
    pub async fn sign_up(&self, sub: &str) -> TestUser {
        let token = token_for(sub);
        let response = self.post(&token, "/api/auth/sync", json!({})).await;
        assert_eq!(response.status(), StatusCode::OK);

        let profile: Value = response.json().await.unwrap();
        TestUser {
            id: profile["id"].as_str().unwrap().to_string(),
            token,
        }
    }

    pub async fn create_ride(&self, driver: &TestUser, seats: i32, price: i64) -> String {
        let response = self
            .post(
                &driver.token,
                "/api/rides",
                json!({
                    "from_location": "North Campus",
                    "to_location": "City Station",
                    "departure_time": in_hours(3),
                    "available_seats": seats,
                    "price_per_seat": price,
                    "description": "Leaving from gate 2"
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let ride: Value = response.json().await.unwrap();
        ride["id"].as_str().unwrap().to_string()
    }

    pub async fn create_request(&self, passenger: &TestUser, seats: i32, price: i64) -> String {
        let response = self
            .post(
                &passenger.token,
                "/api/ride-requests",
                json!({
                    "from_location": "South Hostel",
                    "to_location": "Airport",
                    "preferred_departure_time": in_hours(5),
                    "requested_seats": seats,
                    "price_per_seat": price
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let request: Value = response.json().await.unwrap();
        request["id"].as_str().unwrap().to_string()
    }

    pub async fn book_ride(&self, passenger: &TestUser, ride_id: &str, seats: i32) -> Response {
        self.post(
            &passenger.token,
            "/api/bookings",
            json!({ "ride_id": ride_id, "seats": seats }),
        )
        .await
    }
}

/// Asserts the status and the `kind` of an error body.
pub async fn assert_error(response: Response, status: StatusCode, kind: &str) -> Value {
    assert_eq!(response.status(), status);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], kind, "unexpected error body: {}", body);
    body
}
