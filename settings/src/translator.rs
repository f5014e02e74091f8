//! Maps structured settings onto flat environment variables and back.
//!
//! Keys are only written while a value deviates from what an absent key
//! decodes to, so the store never accumulates redundant keys.

use crate::metrics_defs::STORE_WRITES;
use crate::schema::{Encoding, Field, SettingValue, Settings};
use crate::store::{EnvSnapshot, EnvStore, Scope, StoreError};
use shared::counter;
use std::collections::HashMap;

pub trait KeyLookup {
    fn get(&self, key: &str) -> Option<&str>;
}

impl KeyLookup for EnvSnapshot {
    fn get(&self, key: &str) -> Option<&str> {
        EnvSnapshot::get(self, key)
    }
}

impl KeyLookup for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

/// Desired state of one key: unset stands for the field's default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyState {
    Unset,
    Set(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOp {
    pub key: &'static str,
    pub state: KeyState,
}

/// Rebuilds the structured settings for `fields` from the store's keys.
pub fn read(fields: &[Field], lookup: &impl KeyLookup) -> Settings {
    fields
        .iter()
        .map(|field| (field.name.to_string(), decode(field, lookup.get(field.key))))
        .collect()
}

pub fn decode(field: &Field, raw: Option<&str>) -> SettingValue {
    let Some(raw) = raw else {
        return field.stored_default();
    };

    match field.encoding {
        Encoding::Flag { marker, default } => SettingValue::Bool(if raw == marker {
            !default
        } else {
            default
        }),
        Encoding::Text => SettingValue::Text(raw.to_string()),
        Encoding::Number { default } => match raw.trim().parse::<f64>() {
            Ok(n) => SettingValue::Number(n),
            Err(_) => {
                tracing::warn!(key = field.key, value = raw, "ignoring unparsable number");
                SettingValue::Number(default)
            }
        },
        Encoding::Member { token } => {
            SettingValue::Bool(raw.split(',').map(str::trim).any(|t| t == token))
        }
    }
}

/// Computes one operation per distinct key of `fields`, in declaration order.
/// Fields missing from `settings` are treated as their default.
pub fn write(fields: &[Field], settings: &Settings) -> Vec<StoreOp> {
    let mut ops: Vec<StoreOp> = Vec::with_capacity(fields.len());

    for field in fields {
        if ops.iter().any(|op| op.key == field.key) {
            continue;
        }

        let state = match field.encoding {
            Encoding::Member { .. } => encode_members(fields, field.key, settings),
            _ => encode(field, settings.get(field.name)),
        };
        ops.push(StoreOp {
            key: field.key,
            state,
        });
    }

    ops
}

fn encode(field: &Field, value: Option<&SettingValue>) -> KeyState {
    let value = match value {
        Some(v) => v,
        None => return KeyState::Unset,
    };

    match (field.encoding, value) {
        (Encoding::Flag { marker, default }, SettingValue::Bool(b)) if *b != default => {
            KeyState::Set(marker.to_string())
        }
        (Encoding::Text, SettingValue::Text(s)) if !s.is_empty() => KeyState::Set(s.clone()),
        (Encoding::Number { default }, SettingValue::Number(n)) if *n != default => {
            KeyState::Set(n.to_string())
        }
        _ => KeyState::Unset,
    }
}

fn encode_members(fields: &[Field], key: &str, settings: &Settings) -> KeyState {
    let mut total = 0;
    let mut enabled = Vec::new();

    for field in fields.iter().filter(|f| f.key == key) {
        if let Encoding::Member { token } = field.encoding {
            total += 1;
            let on = settings
                .get(field.name)
                .and_then(SettingValue::as_bool)
                .unwrap_or(true);
            if on {
                enabled.push(token);
            }
        }
    }

    if enabled.len() == total {
        KeyState::Unset
    } else {
        KeyState::Set(enabled.join(","))
    }
}

/// Applies `ops` one by one. The first failure aborts the sequence; earlier
/// operations stay applied.
pub async fn apply(store: &dyn EnvStore, scope: &Scope, ops: &[StoreOp]) -> Result<(), StoreError> {
    for op in ops {
        match &op.state {
            KeyState::Set(value) => {
                store.create_or_update_variable(scope, op.key, value).await?;
                counter!(STORE_WRITES, "operation" => "set").increment(1);
            }
            KeyState::Unset => {
                store.delete_variable(scope, op.key).await?;
                counter!(STORE_WRITES, "operation" => "delete").increment(1);
            }
        }
    }
    Ok(())
}
