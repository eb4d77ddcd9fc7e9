//! Axum route handlers.
//!
//! - [`assistant`]: relays one chat message to the assistant and streams the reply
//! - [`static_assets`]: serves the embedded chat page

pub mod assistant;
pub mod static_assets;
