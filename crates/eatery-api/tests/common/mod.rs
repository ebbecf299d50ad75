//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use eatery_api::database::{Database, UnitOfWorkScope};
use eatery_api::state::AppState;
use eatery_core::clock::Clock;
use eatery_core::error::DomainError;
use eatery_core::registry::{Registry, RegistryBuilder};
use eatery_core::snapshot::SnapshotCadence;
use eatery_restaurants::application::unit_of_work::RestaurantStores;
use eatery_restaurants::read_model::MallRestaurant;
use eatery_test_support::{FixedClock, InMemoryDatabase, InMemoryTransaction};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Fixed timestamp used across all integration tests.
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

pub fn registry() -> Arc<Registry> {
    Arc::new(
        eatery_restaurants::register_types(RegistryBuilder::new())
            .build()
            .unwrap(),
    )
}

/// In-memory database behind the [`Database`] seam.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    pub db: InMemoryDatabase,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mall_names(&self) -> Vec<String> {
        self.db
            .read_model_rows::<MallRestaurant>()
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    pub fn transaction_stores(tx: &InMemoryTransaction) -> RestaurantStores {
        RestaurantStores {
            events: Arc::new(tx.event_repository()),
            snapshots: Arc::new(tx.snapshot_repository()),
            outbox: Arc::new(tx.outbox()),
            mall: Arc::new(tx.read_model::<MallRestaurant>()),
        }
    }
}

struct InMemoryScope {
    tx: InMemoryTransaction,
    stores: RestaurantStores,
}

#[async_trait]
impl UnitOfWorkScope for InMemoryScope {
    fn restaurant_stores(&self) -> RestaurantStores {
        self.stores.clone()
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit()
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.rollback();
        Ok(())
    }
}

#[async_trait]
impl Database for InMemoryBackend {
    async fn begin(&self) -> Result<Box<dyn UnitOfWorkScope>, DomainError> {
        let tx = self.db.begin();
        let stores = Self::transaction_stores(&tx);
        Ok(Box::new(InMemoryScope { tx, stores }))
    }

    fn restaurant_stores(&self) -> RestaurantStores {
        RestaurantStores {
            events: Arc::new(self.db.event_repository()),
            snapshots: Arc::new(self.db.snapshot_repository()),
            outbox: Arc::new(self.db.outbox()),
            mall: Arc::new(self.db.read_model::<MallRestaurant>()),
        }
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

pub fn app_state(database: Arc<dyn Database>) -> AppState {
    AppState::new(
        database,
        registry(),
        fixed_clock(),
        SnapshotCadence::every(3),
        Duration::from_secs(5),
    )
}

/// Build the full app router over `database`. Uses the same route structure
/// as `main.rs`.
pub fn build_test_app(database: Arc<dyn Database>) -> Router {
    eatery_api::app(app_state(database))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, json_request("POST", uri, body)).await
}

/// Send a PUT request with a JSON body and return the response.
pub async fn put_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, json_request("PUT", uri, body)).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}
