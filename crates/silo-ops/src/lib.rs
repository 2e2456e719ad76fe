//! High-level warehouse operations: datasets, tables, queries, row loads, and
//! bucket transfer, each composing an injected backend with the job watcher.

mod bucket;
mod dataset;
mod error;
mod load;
mod query;
mod table;

pub use bucket::Bucket;
pub use dataset::Dataset;
pub use error::OpsError;
pub use load::{LoadOptions, LoadOutcome, LoadReport, RowLoader};
pub use query::{Query, QueryOutcome, RowsOutcome, ToTableOptions};
pub use table::Table;
