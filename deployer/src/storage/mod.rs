//! Persistent state

pub mod catalog;
pub mod deployments;
pub mod layout;
pub mod settings;
