//! silo binary: parse args, wire the REST backends, run the command.

use clap::Parser;
use silo_cli::cli::Cli;
use silo_cli::render::Palette;
use silo_cli::run;
use silo_storage::RestBlobStore;
use silo_types::{BlobStore, Warehouse};
use silo_warehouse::{RestWarehouse, WarehouseConfig};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = WarehouseConfig::from_env();
    if let Some(ref project) = cli.project {
        config.project = project.clone();
    }
    let project = config.project.clone();
    let warehouse: Arc<dyn Warehouse> = Arc::new(RestWarehouse::new(config));
    let palette = Palette::from_stdout();

    let code = run::dispatch(cli, &project, warehouse, store_for, &palette).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn store_for(bucket: &str) -> Arc<dyn BlobStore> {
    Arc::new(RestBlobStore::from_env(bucket))
}
