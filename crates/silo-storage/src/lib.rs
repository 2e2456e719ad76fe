//! Object-storage backends: GCS-compatible REST client and in-memory fake.

mod memory;
mod rest;

pub use memory::InMemoryBlobStore;
pub use rest::{RestBlobStore, StorageConfig};

pub use silo_types::{BlobStore, BlobStoreError};
