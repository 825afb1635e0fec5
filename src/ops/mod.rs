//! High-level operations.
//!
//! This module contains the implementation of Quay commands.

pub mod cache;
pub mod fetch;

pub use cache::{list_entries, CacheListing};
pub use fetch::{FetchCoordinator, FetchStats, Outcome};
