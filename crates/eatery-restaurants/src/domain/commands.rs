//! Commands for the Restaurants context.

use eatery_core::command::Command;
use uuid::Uuid;

/// Command to register a new restaurant.
#[derive(Debug, Clone)]
pub struct RegisterRestaurant {
    /// Identifier of the restaurant to create.
    pub restaurant_id: Uuid,
    /// Display name.
    pub name: String,
}

impl Command for RegisterRestaurant {
    fn command_name(&self) -> &'static str {
        "restaurants.RegisterRestaurant"
    }

    fn aggregate_id(&self) -> Uuid {
        self.restaurant_id
    }
}

/// Command to rename an existing restaurant.
#[derive(Debug, Clone)]
pub struct RenameRestaurant {
    /// The restaurant to rename.
    pub restaurant_id: Uuid,
    /// The new display name.
    pub name: String,
}

impl Command for RenameRestaurant {
    fn command_name(&self) -> &'static str {
        "restaurants.RenameRestaurant"
    }

    fn aggregate_id(&self) -> Uuid {
        self.restaurant_id
    }
}
