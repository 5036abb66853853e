//! sitedeploy library
//!
//! Core modules for the static site deployment service.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod models;
pub mod proxy;
pub mod report;
pub mod server;
pub mod storage;
pub mod utils;
pub mod workers;
