//! HTTP route modules, one per bounded context.

pub mod health;
pub mod restaurants;
