//! Application services of the Restaurants context.

pub mod command_handlers;
pub mod event_handlers;
pub mod query_handlers;
pub mod unit_of_work;
