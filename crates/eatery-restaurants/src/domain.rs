//! Domain model of the Restaurants context.

pub mod aggregates;
pub mod commands;
pub mod events;
