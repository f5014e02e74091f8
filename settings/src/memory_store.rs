use crate::store::{EnvSnapshot, EnvStore, EnvValue, EnvVariable, Scope, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Default)]
struct Inner {
    variables: HashMap<Scope, BTreeMap<String, String>>,
    configurations: HashMap<Scope, serde_json::Value>,
}

/// In-process store for local development and tests.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds variables for `scope`, replacing existing values with the same key.
    pub fn with_variables<K, V>(self, scope: Scope, variables: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            inner
                .variables
                .entry(scope)
                .or_default()
                .extend(variables.into_iter().map(|(k, v)| (k.into(), v.into())));
        }
        self
    }

    fn snapshot(inner: &Inner, scope: &Scope) -> EnvSnapshot {
        let to_snapshot = |vars: Option<&BTreeMap<String, String>>| {
            EnvSnapshot::from_variables(vars.into_iter().flatten().map(|(key, value)| {
                EnvVariable {
                    key: key.clone(),
                    values: vec![EnvValue::new(value.clone())],
                }
            }))
        };

        let account = to_snapshot(inner.variables.get(&scope.account_scope()));
        match scope.site_id {
            Some(_) => account.overlay(to_snapshot(inner.variables.get(scope))),
            None => account,
        }
    }
}

#[async_trait]
impl EnvStore for MemoryStore {
    async fn list_variables(&self, scope: &Scope) -> Result<EnvSnapshot, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(Self::snapshot(&inner, scope))
    }

    async fn create_or_update_variable(
        &self,
        scope: &Scope,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner
            .variables
            .entry(scope.clone())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_variable(&self, scope: &Scope, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(vars) = inner.variables.get_mut(scope) {
            vars.remove(key);
        }
        Ok(())
    }

    async fn get_configuration(
        &self,
        scope: &Scope,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.configurations.get(scope).cloned())
    }

    async fn upsert_configuration(
        &self,
        scope: &Scope,
        configuration: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.configurations.insert(scope.clone(), configuration);
        Ok(())
    }
}
