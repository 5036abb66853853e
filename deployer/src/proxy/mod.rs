//! Reverse proxy integration

pub mod client;
pub mod reconciler;
pub mod routes;
