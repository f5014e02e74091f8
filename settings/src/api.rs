use crate::metrics_defs::SETTINGS_REQUESTS;
use crate::schema::{Namespace, ScopeKind, Settings, ValidationError, validate};
use crate::store::{EnvStore, Scope, StoreError};
use crate::translator;
use serde_json::{Map, Value};
use shared::counter;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("{message}")]
    Internal {
        message: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ApiError {
    fn internal(message: &'static str) -> impl FnOnce(StoreError) -> ApiError {
        move |source| ApiError::Internal { message, source }
    }

    fn outcome(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) => "invalid",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

/// Identifiers of the team and site a settings call is made for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub team_id: Option<String>,
    pub site_id: Option<String>,
}

impl RequestContext {
    /// Empty identifiers count as missing.
    pub fn scope_for(&self, namespace: Namespace) -> Result<Scope, ApiError> {
        let present = |id: &Option<String>| id.as_deref().filter(|s| !s.is_empty()).map(String::from);

        let team_id = present(&self.team_id).ok_or(ApiError::BadRequest("teamId is required"))?;
        match namespace.scope_kind() {
            ScopeKind::Team => Ok(Scope::account(team_id)),
            ScopeKind::Site => {
                let site_id =
                    present(&self.site_id).ok_or(ApiError::BadRequest("siteId is required"))?;
                Ok(Scope::site(team_id, site_id))
            }
        }
    }
}

/// Query and mutate operations for every settings namespace.
pub struct SettingsApi {
    store: Arc<dyn EnvStore>,
}

impl SettingsApi {
    pub fn new(store: Arc<dyn EnvStore>) -> Self {
        SettingsApi { store }
    }

    /// Returns `None` until the namespace's section of the configuration
    /// document has been saved; the caller falls back to
    /// [`Namespace::form_defaults`].
    pub async fn query(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
    ) -> Result<Option<Settings>, ApiError> {
        let result = self.query_inner(ctx, namespace).await;
        record(namespace, "query", &result);
        result
    }

    async fn query_inner(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
    ) -> Result<Option<Settings>, ApiError> {
        let scope = ctx.scope_for(namespace)?;
        let on_error = "Failed to load site configuration";

        let configuration = self
            .store
            .get_configuration(&scope)
            .await
            .map_err(ApiError::internal(on_error))?;
        let saved = configuration
            .as_ref()
            .and_then(|document| document.get(namespace.section().name()))
            .is_some();
        if !saved {
            return Ok(None);
        }

        let snapshot = self
            .store
            .list_variables(&scope)
            .await
            .map_err(ApiError::internal(on_error))?;
        Ok(Some(translator::read(namespace.fields(), &snapshot)))
    }

    /// Validates `input` and persists it. Variable writes are applied one at
    /// a time without rollback, so a failure can leave earlier writes in place.
    pub async fn mutate(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
        input: &Value,
    ) -> Result<(), ApiError> {
        let result = self.mutate_inner(ctx, namespace, input).await;
        record(namespace, "mutate", &result);
        result
    }

    /// Like [`SettingsApi::mutate`] for a raw JSON request body. Missing
    /// identifiers and malformed bodies are reported through the same path.
    pub async fn mutate_body(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
        body: &[u8],
    ) -> Result<(), ApiError> {
        let result = async {
            ctx.scope_for(namespace)?;
            let input: Value = serde_json::from_slice(body)
                .map_err(|e| ValidationError::Malformed(e.to_string()))?;
            self.mutate_inner(ctx, namespace, &input).await
        }
        .await;
        record(namespace, "mutate", &result);
        result
    }

    async fn mutate_inner(
        &self,
        ctx: &RequestContext,
        namespace: Namespace,
        input: &Value,
    ) -> Result<(), ApiError> {
        let scope = ctx.scope_for(namespace)?;
        let settings = validate(namespace.fields(), input)?;
        let on_error = ApiError::internal(namespace.save_error_message());

        let result = async {
            let existing = self.store.get_configuration(&scope).await?;
            let document = merge_document(existing, namespace, &settings);
            self.store.upsert_configuration(&scope, document).await?;

            let ops = translator::write(namespace.fields(), &settings);
            translator::apply(self.store.as_ref(), &scope, &ops).await
        }
        .await;

        result.map_err(|e| {
            tracing::error!(%namespace, error = %e, "failed to save settings");
            on_error(e)
        })
    }
}

fn record<T>(namespace: Namespace, operation: &'static str, result: &Result<T, ApiError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    counter!(
        SETTINGS_REQUESTS,
        "namespace" => namespace.name(),
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

/// Records the submitted values in the scope's configuration document. Each
/// value lands in the section of the primary namespace declaring its field,
/// and a section created here starts from the form defaults of the fields
/// that namespace owns.
fn merge_document(existing: Option<Value>, namespace: Namespace, settings: &Settings) -> Value {
    let mut document = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    for (name, value) in settings {
        let owner = Namespace::owner_of(name).unwrap_or(namespace);
        let section = document
            .entry(owner.name())
            .or_insert_with(|| section_defaults(owner));
        if !section.is_object() {
            *section = Value::Object(Map::new());
        }
        if let Some(section) = section.as_object_mut() {
            section.insert(name.clone(), serde_json::to_value(value).unwrap_or_default());
        }
    }

    Value::Object(document)
}

fn section_defaults(owner: Namespace) -> Value {
    let section: Map<String, Value> = owner
        .fields()
        .iter()
        .filter(|f| Namespace::owner_of(f.name) == Some(owner))
        .filter_map(|f| {
            let value = serde_json::to_value(f.form_default.to_value()).ok()?;
            Some((f.name.to_string(), value))
        })
        .collect();
    Value::Object(section)
}
