//! Fleet definitions and orchestration

pub mod orchestrator;
pub mod services;
