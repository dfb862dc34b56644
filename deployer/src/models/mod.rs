//! Data models

pub mod history;
