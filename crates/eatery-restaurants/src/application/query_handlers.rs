//! Query handlers for the Restaurants context.

use eatery_core::aggregate::AggregateRoot;
use eatery_core::error::DomainError;
use eatery_core::repository::AggregateRepository;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{AGGREGATE_NAME, Restaurant};
use crate::read_model::{MallRepository, MallRestaurant};

/// Read-only view of a restaurant aggregate.
#[derive(Debug, Serialize)]
pub struct RestaurantView {
    /// The restaurant identifier.
    pub restaurant_id: Uuid,
    /// Current display name.
    pub name: String,
    /// Current stream version.
    pub version: i64,
}

/// Retrieves a restaurant by its aggregate ID.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no events exist for the ID, or any
/// store error raised while loading.
pub async fn get_restaurant(
    restaurant_id: Uuid,
    repository: &AggregateRepository<Restaurant>,
) -> Result<RestaurantView, DomainError> {
    let restaurant = repository.load(restaurant_id).await?;
    let Some(name) = restaurant.name() else {
        return Err(DomainError::NotFound {
            aggregate_name: AGGREGATE_NAME.to_owned(),
            aggregate_id: restaurant_id,
        });
    };
    Ok(RestaurantView {
        restaurant_id,
        name: name.to_owned(),
        version: restaurant.version(),
    })
}

/// Lists every restaurant of the mall read model.
///
/// # Errors
///
/// Returns the read model's store error.
pub async fn list_mall_restaurants(
    mall: &MallRepository,
) -> Result<Vec<MallRestaurant>, DomainError> {
    mall.list().await
}
