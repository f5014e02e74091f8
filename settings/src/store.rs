//! The external key/value store: per-account and per-site environment
//! variables plus a per-scope configuration document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("store returned {status} for {operation}")]
    Status {
        operation: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("store is read-only")]
    ReadOnly,
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
    #[error("missing API token: {0}")]
    MissingToken(String),
}

/// Identifies where a variable lives. Variables without a site id apply to
/// every site of the account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub account_id: String,
    pub site_id: Option<String>,
}

impl Scope {
    pub fn account(account_id: impl Into<String>) -> Self {
        Scope {
            account_id: account_id.into(),
            site_id: None,
        }
    }

    pub fn site(account_id: impl Into<String>, site_id: impl Into<String>) -> Self {
        Scope {
            account_id: account_id.into(),
            site_id: Some(site_id.into()),
        }
    }

    pub fn account_scope(&self) -> Scope {
        Scope::account(self.account_id.clone())
    }
}

fn all_contexts() -> String {
    "all".to_string()
}

/// One value of a variable, scoped to a deploy context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvValue {
    pub value: String,
    #[serde(default = "all_contexts")]
    pub context: String,
}

impl EnvValue {
    pub fn new(value: impl Into<String>) -> Self {
        EnvValue {
            value: value.into(),
            context: all_contexts(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvVariable {
    pub key: String,
    #[serde(default)]
    pub values: Vec<EnvValue>,
}

/// Variables visible to one scope at one point in time.
///
/// Only the first value of each variable is ever consulted.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, Vec<EnvValue>>,
}

impl EnvSnapshot {
    pub fn from_variables(variables: impl IntoIterator<Item = EnvVariable>) -> Self {
        EnvSnapshot {
            vars: variables
                .into_iter()
                .map(|var| (var.key, var.values))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .and_then(|values| values.first())
            .map(|v| v.value.as_str())
    }

    /// Keys and first values, ordered by key. Variables without values are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().filter_map(|(key, values)| {
            values
                .first()
                .map(|v| (key.as_str(), v.value.as_str()))
        })
    }

    /// Entries of `other` replace entries with the same key.
    pub fn overlay(mut self, other: EnvSnapshot) -> Self {
        self.vars.extend(other.vars);
        self
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for EnvSnapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        EnvSnapshot {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), vec![EnvValue::new(v)]))
                .collect(),
        }
    }
}

#[async_trait]
pub trait EnvStore: Send + Sync {
    /// Variables visible to `scope`. For a site scope this includes the
    /// account-level variables, with site-level values taking precedence.
    async fn list_variables(&self, scope: &Scope) -> Result<EnvSnapshot, StoreError>;

    async fn create_or_update_variable(
        &self,
        scope: &Scope,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Deleting a variable that does not exist succeeds.
    async fn delete_variable(&self, scope: &Scope, key: &str) -> Result<(), StoreError>;

    async fn get_configuration(
        &self,
        scope: &Scope,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    async fn upsert_configuration(
        &self,
        scope: &Scope,
        configuration: serde_json::Value,
    ) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_first_value_wins() {
        let snapshot = EnvSnapshot::from_variables([EnvVariable {
            key: "SIMPLE_ANALYTICS_DATA_MODE".into(),
            values: vec![
                EnvValue {
                    value: "hash".into(),
                    context: "production".into(),
                },
                EnvValue {
                    value: "history".into(),
                    context: "deploy-preview".into(),
                },
            ],
        }]);

        assert_eq!(snapshot.get("SIMPLE_ANALYTICS_DATA_MODE"), Some("hash"));
        assert_eq!(snapshot.get("MISSING"), None);
    }

    #[test]
    fn test_snapshot_overlay_and_order() {
        let account: EnvSnapshot = [("B_KEY", "account"), ("A_KEY", "account")]
            .into_iter()
            .collect();
        let site: EnvSnapshot = [("B_KEY", "site")].into_iter().collect();

        let merged = account.overlay(site);
        let entries: Vec<_> = merged.iter().collect();
        assert_eq!(entries, vec![("A_KEY", "account"), ("B_KEY", "site")]);
    }

    #[test]
    fn test_variable_without_values_is_skipped() {
        let snapshot = EnvSnapshot::from_variables([EnvVariable {
            key: "EMPTY".into(),
            values: vec![],
        }]);
        assert_eq!(snapshot.get("EMPTY"), None);
        assert_eq!(snapshot.iter().count(), 0);
    }

    #[test]
    fn test_deserialize_variable() {
        let var: EnvVariable =
            serde_json::from_str(r#"{"key": "ENABLE_SIMPLE_ANALYTICS", "values": [{"value": "true"}]}"#)
                .unwrap();
        assert_eq!(var.values[0].context, "all");
    }
}
