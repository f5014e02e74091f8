use crate::store::{EnvSnapshot, EnvStore, EnvValue, EnvVariable, Scope, StoreError};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// Scopes a variable written by the extension is visible in.
const VARIABLE_SCOPES: &[&str] = &["builds", "functions", "runtime", "post-processing"];

#[derive(Serialize)]
struct VariableBody<'a> {
    key: &'a str,
    scopes: &'a [&'a str],
    values: Vec<EnvValue>,
}

/// Client for the hosting platform's REST API.
#[derive(Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl PlatformClient {
    pub fn new(base_url: Url, token: String, timeout: Duration) -> Result<Self, StoreError> {
        if base_url.cannot_be_a_base() {
            return Err(StoreError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(PlatformClient {
            client,
            base_url,
            token,
        })
    }

    fn url(&self, scope: &Scope, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["accounts", scope.account_id.as_str()])
            .extend(segments);

        if let Some(site_id) = &scope.site_id {
            url.query_pairs_mut().append_pair("site_id", site_id);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }
}

fn check(operation: &'static str, response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        tracing::warn!(operation, %status, "store request failed");
        Err(StoreError::Status { operation, status })
    }
}

#[async_trait]
impl EnvStore for PlatformClient {
    async fn list_variables(&self, scope: &Scope) -> Result<EnvSnapshot, StoreError> {
        let url = self.url(scope, &["env"])?;
        let response = self.request(Method::GET, url).send().await?;
        let variables = check("list_variables", response)?
            .json::<Vec<EnvVariable>>()
            .await?;

        Ok(EnvSnapshot::from_variables(variables))
    }

    async fn create_or_update_variable(
        &self,
        scope: &Scope,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let body = VariableBody {
            key,
            scopes: VARIABLE_SCOPES,
            values: vec![EnvValue::new(value)],
        };

        let url = self.url(scope, &["env", key])?;
        let response = self.request(Method::PUT, url).json(&body).send().await?;

        if response.status() != StatusCode::NOT_FOUND {
            check("update_variable", response)?;
            return Ok(());
        }

        // Not there yet, create it.
        let url = self.url(scope, &["env"])?;
        let response = self
            .request(Method::POST, url)
            .json(&[body])
            .send()
            .await?;
        check("create_variable", response)?;
        Ok(())
    }

    async fn delete_variable(&self, scope: &Scope, key: &str) -> Result<(), StoreError> {
        let url = self.url(scope, &["env", key])?;
        let response = self.request(Method::DELETE, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check("delete_variable", response)?;
        Ok(())
    }

    async fn get_configuration(
        &self,
        scope: &Scope,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let url = self.url(scope, &["extension-configuration"])?;
        let response = self.request(Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let configuration = check("get_configuration", response)?.json().await?;
        Ok(Some(configuration))
    }

    async fn upsert_configuration(
        &self,
        scope: &Scope,
        configuration: serde_json::Value,
    ) -> Result<(), StoreError> {
        let url = self.url(scope, &["extension-configuration"])?;
        let response = self
            .request(Method::PUT, url)
            .json(&configuration)
            .send()
            .await?;
        check("upsert_configuration", response)?;
        Ok(())
    }
}
