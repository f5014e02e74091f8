use crate::schema::keys;
use crate::store::{EnvSnapshot, EnvStore, Scope, StoreError};
use async_trait::async_trait;
use std::ffi::OsString;

/// Read-only view of the extension's variables in the process environment,
/// the way the hosting platform exposes them to edge code. The scope is ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvStore;

#[async_trait]
impl EnvStore for ProcessEnvStore {
    async fn list_variables(&self, _scope: &Scope) -> Result<EnvSnapshot, StoreError> {
        Ok(extension_vars(std::env::vars_os()))
    }

    async fn create_or_update_variable(
        &self,
        _scope: &Scope,
        _key: &str,
        _value: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn delete_variable(&self, _scope: &Scope, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    async fn get_configuration(
        &self,
        _scope: &Scope,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(None)
    }

    async fn upsert_configuration(
        &self,
        _scope: &Scope,
        _configuration: serde_json::Value,
    ) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }
}

/// Extension variables among `vars`. Entries whose key or value is not valid
/// UTF-8 are skipped; none of the extension's keys can be spelled that way.
fn extension_vars(vars: impl Iterator<Item = (OsString, OsString)>) -> EnvSnapshot {
    vars.filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .filter(|(key, _)| keys::is_extension_key(key))
        .collect()
}
