//! Core types and traits for the silo warehouse client.
//!
//! Job/state DTOs follow the wire shapes of the BigQuery v2 job API for JSON compatibility.

mod job;
mod table;
mod traits;

pub use job::*;
pub use table::*;
pub use traits::*;
