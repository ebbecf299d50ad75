//! Eatery HTTP API.
//!
//! Exposes the bounded contexts over axum. Every mutating request runs as one
//! unit of work inside one database transaction.

pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the application router. Shared by `main` and the integration tests
/// so both serve the same routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/restaurants", routes::restaurants::router())
        .nest("/api/v1/mall", routes::restaurants::mall_router())
        .with_state(state)
}
