//! fleet-deploy library
//!
//! Builds, ships, activates and verifies fleet services, rolls natively
//! supervised services back on failure, and keeps the deployment ledger.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod fleet;
pub mod ledger;
pub mod logs;
pub mod models;
pub mod storage;
pub mod utils;
