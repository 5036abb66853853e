//! Deployment module

pub mod acquirer;
pub mod archive;
pub mod fsm;
pub mod git;
pub mod pipeline;
pub mod sanitizer;
