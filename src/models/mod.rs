//! Data models

mod approval;
mod log_entry;

pub use approval::*;
pub use log_entry::*;
