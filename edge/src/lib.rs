//! Edge runtime: serves the analytics routes in front of a site origin and
//! injects the vendor scripts into its HTML pages.

pub mod config;
pub mod errors;
pub mod http;
pub mod inject;
pub mod metrics_defs;
pub mod script;
pub mod service;

#[cfg(test)]
mod testutils;

use errors::EdgeError;
use service::EdgeService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;

pub async fn run(config: config::Config) -> Result<(), EdgeError> {
    config.validate()?;
    let store = config.store.build()?;
    let edge_service = EdgeService::new(&config, store)?;

    let edge_task = run_http_service(&config.listener.host, config.listener.port, edge_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, EdgeError>::new(|| true),
    );

    tokio::try_join!(edge_task, admin_task)?;
    Ok(())
}
