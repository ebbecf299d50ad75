//! Routes for the Restaurants bounded context.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use eatery_core::error::DomainError;
use eatery_restaurants::application::query_handlers::{self, RestaurantView};
use eatery_restaurants::application::unit_of_work::{UnitOfWork, restaurant_repository};
use eatery_restaurants::application::command_handlers;
use eatery_restaurants::domain::commands::{RegisterRestaurant, RenameRestaurant};
use eatery_restaurants::domain::events::RestaurantDomainEvent;
use eatery_restaurants::read_model::MallRestaurant;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// How often a unit of work that lost an optimistic concurrency race is
/// rerun before the conflict is returned to the client.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Request body for POST /api/v1/restaurants.
#[derive(Debug, Deserialize)]
pub struct RegisterRestaurantRequest {
    /// Client-chosen identifier; generated when absent.
    #[serde(default)]
    pub restaurant_id: Option<Uuid>,
    /// Display name.
    pub name: String,
}

/// Request body for PUT /api/v1/restaurants/{id}/name.
#[derive(Debug, Deserialize)]
pub struct RenameRestaurantRequest {
    /// The new display name.
    pub name: String,
}

/// Response body returned after a command is successfully handled.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// The restaurant the command targeted.
    pub restaurant_id: Uuid,
    /// IDs of the domain events produced and persisted.
    pub event_ids: Vec<Uuid>,
}

impl CommandResponse {
    fn new(restaurant_id: Uuid, events: &[RestaurantDomainEvent]) -> Self {
        Self {
            restaurant_id,
            event_ids: events.iter().map(|e| e.metadata.event_id).collect(),
        }
    }
}

enum RestaurantCommand {
    Register(RegisterRestaurant),
    Rename(RenameRestaurant),
}

/// Fails with `DomainError::Transient` once `timeout` elapses. Dropping the
/// unfinished future drops its transaction, which rolls back.
async fn bounded<T>(
    timeout: Duration,
    work: impl Future<Output = Result<T, DomainError>>,
) -> Result<T, DomainError> {
    tokio::time::timeout(timeout, work)
        .await
        .unwrap_or_else(|_| Err(DomainError::Transient(format!("request exceeded {timeout:?}"))))
}

/// Runs `command` in its own transaction.
async fn execute_once(
    state: &AppState,
    command: &RestaurantCommand,
) -> Result<Vec<RestaurantDomainEvent>, DomainError> {
    let scope = state.database.begin().await?;
    let uow = UnitOfWork::new(
        scope.restaurant_stores(),
        Arc::clone(&state.registry),
        state.snapshot_cadence,
    );
    let outcome = match command {
        RestaurantCommand::Register(command) => {
            command_handlers::handle_register_restaurant(command, state.clock.as_ref(), &uow).await
        }
        RestaurantCommand::Rename(command) => {
            command_handlers::handle_rename_restaurant(command, state.clock.as_ref(), &uow).await
        }
    };
    match outcome {
        Ok(events) => {
            scope.commit().await?;
            Ok(events)
        }
        Err(e) => {
            if let Err(rollback_err) = scope.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Runs `command`, rerunning the whole unit of work on `Conflict`.
async fn execute(
    state: &AppState,
    command: &RestaurantCommand,
) -> Result<Vec<RestaurantDomainEvent>, DomainError> {
    let mut retries = 0;
    loop {
        match execute_once(state, command).await {
            Err(e @ DomainError::Conflict { .. }) if retries < MAX_CONFLICT_RETRIES => {
                retries += 1;
                warn!(error = %e, retries, "retrying unit of work after conflict");
            }
            result => return result,
        }
    }
}

/// POST /api/v1/restaurants
#[instrument(skip_all)]
async fn register_restaurant(
    State(state): State<AppState>,
    Json(request): Json<RegisterRestaurantRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let restaurant_id = request.restaurant_id.unwrap_or_else(Uuid::new_v4);
    let command = RestaurantCommand::Register(RegisterRestaurant {
        restaurant_id,
        name: request.name,
    });

    info!(%restaurant_id, "handling register_restaurant command");

    let events = bounded(state.request_timeout, execute(&state, &command)).await?;

    Ok((
        StatusCode::CREATED,
        Json(CommandResponse::new(restaurant_id, &events)),
    ))
}

/// PUT /api/v1/restaurants/{restaurant_id}/name
#[instrument(skip_all, fields(%restaurant_id))]
async fn rename_restaurant(
    State(state): State<AppState>,
    Path(restaurant_id): Path<Uuid>,
    Json(request): Json<RenameRestaurantRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let command = RestaurantCommand::Rename(RenameRestaurant {
        restaurant_id,
        name: request.name,
    });

    info!("handling rename_restaurant command");

    let events = bounded(state.request_timeout, execute(&state, &command)).await?;

    Ok(Json(CommandResponse::new(restaurant_id, &events)))
}

/// GET /api/v1/restaurants/{restaurant_id}
#[instrument(skip_all, fields(%restaurant_id))]
async fn get_restaurant(
    State(state): State<AppState>,
    Path(restaurant_id): Path<Uuid>,
) -> Result<Json<RestaurantView>, ApiError> {
    let stores = state.database.restaurant_stores();
    let repository = restaurant_repository(
        stores.events,
        stores.snapshots,
        Arc::clone(&state.registry),
        state.snapshot_cadence,
    );

    let view = bounded(
        state.request_timeout,
        query_handlers::get_restaurant(restaurant_id, &repository),
    )
    .await?;

    Ok(Json(view))
}

/// GET /api/v1/mall/restaurants
#[instrument(skip_all)]
async fn list_mall_restaurants(
    State(state): State<AppState>,
) -> Result<Json<Vec<MallRestaurant>>, ApiError> {
    let stores = state.database.restaurant_stores();

    let restaurants = bounded(
        state.request_timeout,
        query_handlers::list_mall_restaurants(stores.mall.as_ref()),
    )
    .await?;

    Ok(Json(restaurants))
}

/// Returns the router for the restaurants context.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_restaurant))
        .route("/{restaurant_id}", get(get_restaurant))
        .route("/{restaurant_id}/name", put(rename_restaurant))
}

/// Returns the router for the mall read model.
pub fn mall_router() -> Router<AppState> {
    Router::new().route("/restaurants", get(list_mall_restaurants))
}
