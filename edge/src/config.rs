use serde::Deserialize;
use settings::config::{Listener, StoreConfig};
use settings::store::Scope;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error(transparent)]
    Settings(#[from] settings::config::ValidationError),

    #[error("Origin must be an http URL: {0}")]
    InvalidOrigin(Url),

    #[error("Vendor URL must be an http or https URL: {0}")]
    InvalidVendorUrl(String),

    #[error("Timeout cannot be 0")]
    InvalidTimeout,

    #[error("Empty account id")]
    EmptyAccountId,
}

/// How `/proxy.js` reaches the vendor's proxy script
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProxyScriptMode {
    /// Fetch the script and return it from this host
    #[default]
    Forward,
    /// Answer with a redirect to the vendor
    Redirect,
}

/// Hosts of the analytics vendor
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct VendorHosts {
    /// Serves `latest.js` and `auto-events.js`
    #[serde(default = "default_cdn")]
    pub cdn: String,
    /// Receives page views and events sent to `/simple/*`
    #[serde(default = "default_queue")]
    pub queue: String,
    /// Serves the proxy script
    #[serde(default = "default_external")]
    pub external: String,
}

fn default_cdn() -> String {
    "https://scripts.simpleanalyticscdn.com".to_string()
}

fn default_queue() -> String {
    "https://queue.simpleanalyticscdn.com".to_string()
}

fn default_external() -> String {
    "https://simpleanalyticsexternal.com".to_string()
}

impl Default for VendorHosts {
    fn default() -> Self {
        VendorHosts {
            cdn: default_cdn(),
            queue: default_queue(),
            external: default_external(),
        }
    }
}

/// Parsed [`VendorHosts`].
#[derive(Clone, Debug, PartialEq)]
pub struct VendorUrls {
    pub cdn: Url,
    pub queue: Url,
    pub external: Url,
}

impl VendorHosts {
    pub fn parse(&self) -> Result<VendorUrls, ValidationError> {
        let parse = |raw: &str| {
            Url::parse(raw)
                .ok()
                .filter(|url| matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base())
                .ok_or_else(|| ValidationError::InvalidVendorUrl(raw.to_string()))
        };
        Ok(VendorUrls {
            cdn: parse(&self.cdn)?,
            queue: parse(&self.queue)?,
            external: parse(&self.external)?,
        })
    }
}

/// The site whose variables drive the edge handlers
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SiteConfig {
    pub account_id: String,
    #[serde(default)]
    pub site_id: Option<String>,
}

impl SiteConfig {
    pub fn scope(&self) -> Scope {
        match &self.site_id {
            Some(site_id) => Scope::site(&self.account_id, site_id),
            None => Scope::account(&self.account_id),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Edge runtime configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for incoming requests
    pub listener: Listener,
    /// Admin listener for health checks
    pub admin_listener: Listener,
    /// Site origin HTML pages are fetched from
    pub origin: Url,
    #[serde(default)]
    pub vendor: VendorHosts,
    #[serde(default)]
    pub proxy_script: ProxyScriptMode,
    pub site: SiteConfig,
    pub store: StoreConfig,
    /// Applies to each upstream request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        self.store.validate()?;

        if self.origin.scheme() != "http" || self.origin.cannot_be_a_base() {
            return Err(ValidationError::InvalidOrigin(self.origin.clone()));
        }
        self.vendor.parse()?;
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.site.account_id.is_empty() {
            return Err(ValidationError::EmptyAccountId);
        }
        Ok(())
    }
}
