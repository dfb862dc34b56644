//! Single-service deployment stages

pub mod activation;
pub mod attempt;
pub mod compile;
pub mod health;
pub mod pipeline;
pub mod remote;
pub mod rollback;
pub mod stamp;
pub mod transfer;
