//! Command implementations

pub mod cache;
pub mod fetch;
