//! Shared utilities

pub mod error;
pub mod partition;

pub use error::{StoreError, StoreResult};
