//! Request handlers.

pub mod analysis;
pub mod health;

pub use health::{health, model_status, ping};
