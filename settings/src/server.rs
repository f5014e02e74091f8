use crate::api::{ApiError, RequestContext, SettingsApi};
use crate::config::Listener;
use crate::schema::{Namespace, UnknownNamespace};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;

const TEAM_ID_HEADER: &str = "x-team-id";
const SITE_ID_HEADER: &str = "x-site-id";

pub fn router(api: Arc<SettingsApi>) -> Router {
    Router::new()
        .route("/settings/{namespace}", get(query).post(mutate))
        .route("/settings/{namespace}/defaults", get(defaults))
        .with_state(api)
}

pub async fn serve(listener: &Listener, api: Arc<SettingsApi>) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let tcp = TcpListener::bind(addr).await?;
    tracing::info!("settings api listening on {}", tcp.local_addr()?);
    axum::serve(tcp, router(api)).await
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'static str>,
}

impl ErrorBody {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        ErrorBody {
            code,
            message: message.into(),
            field: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ErrorBody::new("BAD_REQUEST", *message))
            }
            ApiError::Validation(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    field: e.field(),
                    ..ErrorBody::new("VALIDATION_FAILED", e.to_string())
                },
            ),
            ApiError::Internal { message, source } => {
                tracing::error!(error = %source, "{message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("INTERNAL_SERVER_ERROR", *message),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for UnknownNamespace {
    fn into_response(self) -> Response {
        let body = ErrorBody::new("NOT_FOUND", self.to_string());
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }
}

fn context(headers: &HeaderMap) -> RequestContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
    };
    RequestContext {
        team_id: header(TEAM_ID_HEADER),
        site_id: header(SITE_ID_HEADER),
    }
}

async fn query(
    State(api): State<Arc<SettingsApi>>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
) -> Response {
    let namespace = match namespace.parse::<Namespace>() {
        Ok(ns) => ns,
        Err(e) => return e.into_response(),
    };
    match api.query(&context(&headers), namespace).await {
        Ok(settings) => Json(settings).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn mutate(
    State(api): State<Arc<SettingsApi>>,
    Path(namespace): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let namespace = match namespace.parse::<Namespace>() {
        Ok(ns) => ns,
        Err(e) => return e.into_response(),
    };
    let result = api.mutate_body(&context(&headers), namespace, &body).await;

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn defaults(Path(namespace): Path<String>) -> Response {
    match namespace.parse::<Namespace>() {
        Ok(ns) => Json(ns.form_defaults()).into_response(),
        Err(e) => e.into_response(),
    }
}
