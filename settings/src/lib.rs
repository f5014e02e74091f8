//! Settings API of the Simple Analytics extension.
//!
//! Exposes one query and one mutate operation per settings namespace and
//! persists values as environment variables in an [`store::EnvStore`].

pub mod api;
pub mod config;
pub mod memory_store;
pub mod metrics_defs;
pub mod platform_client;
pub mod process_env;
pub mod schema;
pub mod server;
pub mod store;
pub mod translator;

#[cfg(test)]
mod testutils;

use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] config::ValidationError),
    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}

pub async fn run(config: config::Config) -> Result<(), SettingsError> {
    config.validate()?;
    let store = config.store.build()?;
    let api = Arc::new(api::SettingsApi::new(store));

    let api_task = async {
        server::serve(&config.listener, api)
            .await
            .map_err(SettingsError::from)
    };
    let admin_service = AdminService::<_, SettingsError>::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(api_task, admin_task)?;
    Ok(())
}
