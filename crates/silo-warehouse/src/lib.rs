//! Warehouse backends: BigQuery-compatible REST client and in-memory fake.

mod memory;
mod rest;

pub use memory::{InMemoryWarehouse, StatusStep};
pub use rest::{RestWarehouse, WarehouseConfig};

pub use silo_types::{Warehouse, WarehouseError};
