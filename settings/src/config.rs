use crate::memory_store::MemoryStore;
use crate::platform_client::PlatformClient;
use crate::process_env::ProcessEnvStore;
use crate::store::{EnvStore, Scope, StoreError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Store timeout cannot be 0")]
    InvalidTimeout,

    #[error("Seeded variables need a non-empty account id")]
    EmptyAccountId,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_token_env() -> String {
    "PLATFORM_API_TOKEN".to_string()
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SeededScope {
    pub account_id: String,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Where environment variables and configuration documents are kept.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum StoreConfig {
    /// The hosting platform's REST API.
    Platform {
        api_url: Url,
        /// Token literal. Takes precedence over `token_env`.
        #[serde(default)]
        token: Option<String>,
        /// Name of the environment variable holding the token.
        #[serde(default = "default_token_env")]
        token_env: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// In-process store, optionally seeded.
    Memory {
        #[serde(default)]
        seed: Vec<SeededScope>,
    },
    /// Read-only view of this process's environment.
    ProcessEnv,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            StoreConfig::Platform { timeout_secs, .. } if *timeout_secs == 0 => {
                Err(ValidationError::InvalidTimeout)
            }
            StoreConfig::Memory { seed } if seed.iter().any(|s| s.account_id.is_empty()) => {
                Err(ValidationError::EmptyAccountId)
            }
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Result<Arc<dyn EnvStore>, StoreError> {
        match self {
            StoreConfig::Platform {
                api_url,
                token,
                token_env,
                timeout_secs,
            } => {
                let token = match token {
                    Some(token) => token.clone(),
                    None => std::env::var(token_env)
                        .map_err(|_| StoreError::MissingToken(token_env.clone()))?,
                };
                let client =
                    PlatformClient::new(api_url.clone(), token, Duration::from_secs(*timeout_secs))?;
                Ok(Arc::new(client))
            }
            StoreConfig::Memory { seed } => {
                let store = seed.iter().fold(MemoryStore::new(), |store, seeded| {
                    let scope = match &seeded.site_id {
                        Some(site_id) => Scope::site(&seeded.account_id, site_id),
                        None => Scope::account(&seeded.account_id),
                    };
                    store.with_variables(scope, seeded.variables.clone())
                });
                Ok(Arc::new(store))
            }
            StoreConfig::ProcessEnv => Ok(Arc::new(ProcessEnvStore)),
        }
    }
}

/// Settings API configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the settings RPC routes
    pub listener: Listener,
    /// Admin listener for health checks
    pub admin_listener: Listener,
    pub store: StoreConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.store.validate()
    }
}
