use crate::config::{Config, ProxyScriptMode, VendorUrls};
use crate::errors::EdgeError;
use crate::http::{fetch_upstream, forward_to_origin, join_path_and_query};
use crate::inject::InjectBody;
use crate::metrics_defs::{
    CONFIG_RESOLUTION_FAILED, REQUEST_DURATION, REQUESTS_INFLIGHT, SCRIPTS_INJECTED,
};
use crate::script::{ScriptConfig, build_scripts};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use routing::{Route, RouteTable};
use settings::store::{EnvStore, Scope};
use shared::http::make_error_response;
use shared::{counter, gauge, histogram};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

type EdgeBody = BoxBody<Bytes, EdgeError>;

/// Handler bound to each edge path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeRoute {
    ProxyScript,
    AutoEvents,
    Collect,
    Inject,
}

impl EdgeRoute {
    fn as_str(&self) -> &'static str {
        match self {
            EdgeRoute::ProxyScript => "proxy_script",
            EdgeRoute::AutoEvents => "auto_events",
            EdgeRoute::Collect => "collect",
            EdgeRoute::Inject => "inject",
        }
    }
}

fn edge_routes() -> RouteTable<EdgeRoute> {
    RouteTable::new(vec![
        Route::new("/proxy.js", EdgeRoute::ProxyScript),
        Route::new("/auto-events.js", EdgeRoute::AutoEvents),
        Route::new("/simple/*", EdgeRoute::Collect),
        Route::new("/*", EdgeRoute::Inject),
    ])
}

struct EdgeState {
    store: Arc<dyn EnvStore>,
    scope: Scope,
    origin: Url,
    vendor: VendorUrls,
    proxy_script: ProxyScriptMode,
    timeout: Duration,
    routes: RouteTable<EdgeRoute>,
    origin_client: Client<HttpConnector, Incoming>,
    vendor_client: reqwest::Client,
}

/// Serves the analytics edge routes in front of the site origin.
#[derive(Clone)]
pub struct EdgeService {
    state: Arc<EdgeState>,
}

impl EdgeService {
    pub fn new(config: &Config, store: Arc<dyn EnvStore>) -> Result<Self, EdgeError> {
        let origin_client = Client::builder(TokioExecutor::new())
            .http2_adaptive_window(true)
            .build(HttpConnector::new());
        let vendor_client = reqwest::Client::builder()
            .build()
            .map_err(|e| EdgeError::InternalError(format!("Failed to build HTTP client: {e}")))?;

        Ok(EdgeService {
            state: Arc::new(EdgeState {
                store,
                scope: config.site.scope(),
                origin: config.origin.clone(),
                vendor: config.vendor.parse()?,
                proxy_script: config.proxy_script,
                timeout: Duration::from_secs(config.timeout_secs),
                routes: edge_routes(),
                origin_client,
                vendor_client,
            }),
        })
    }
}

impl Service<Request<Incoming>> for EdgeService {
    type Response = Response<EdgeBody>;
    type Error = EdgeError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            let start = Instant::now();
            gauge!(REQUESTS_INFLIGHT).increment(1.0);

            let (route, response) = state.handle(req).await;

            gauge!(REQUESTS_INFLIGHT).decrement(1.0);
            histogram!(
                REQUEST_DURATION,
                "route" => route,
                "status" => response.status().as_u16().to_string()
            )
            .record(start.elapsed().as_secs_f64());
            Ok(response)
        })
    }
}

impl EdgeState {
    /// Returns the label of the handler that ran along with its response.
    async fn handle(&self, req: Request<Incoming>) -> (&'static str, Response<EdgeBody>) {
        let config = match self.store.list_variables(&self.scope).await {
            Ok(snapshot) => Some(ScriptConfig::from_snapshot(&snapshot)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to resolve site configuration");
                counter!(CONFIG_RESOLUTION_FAILED).increment(1);
                None
            }
        };

        let matched = match &config {
            Some(c) if c.is_active() => self
                .routes
                .resolve(&req)
                .map(|m| (*m.action, m.rest.to_string())),
            _ => None,
        };
        let (Some(config), Some((route, rest))) = (config, matched) else {
            return ("passthrough", respond(self.pass_through(req).await));
        };

        let result = match route {
            EdgeRoute::ProxyScript => self.proxy_script(req).await,
            EdgeRoute::AutoEvents => {
                let url = join_path_and_query(&self.vendor.cdn, "/auto-events.js", None);
                self.fetch(url, req).await
            }
            EdgeRoute::Collect => {
                let url = join_path_and_query(&self.vendor.queue, &rest, req.uri().query());
                self.fetch(url, req).await
            }
            EdgeRoute::Inject => self.inject(req, &config).await,
        };
        (route.as_str(), respond(result))
    }

    async fn pass_through(&self, req: Request<Incoming>) -> Result<Response<EdgeBody>, EdgeError> {
        let response = forward_to_origin(&self.origin_client, &self.origin, req, self.timeout).await?;
        Ok(response.map(|body| body.map_err(EdgeError::from).boxed()))
    }

    async fn fetch(&self, url: Url, req: Request<Incoming>) -> Result<Response<EdgeBody>, EdgeError> {
        let response = fetch_upstream(&self.vendor_client, url, req, self.timeout).await?;
        Ok(response.map(|body| Full::new(body).map_err(|e| match e {}).boxed()))
    }

    async fn proxy_script(&self, req: Request<Incoming>) -> Result<Response<EdgeBody>, EdgeError> {
        let hostname = request_hostname(&req).unwrap_or_default();
        let url = proxy_script_url(&self.vendor.external, &hostname);
        tracing::debug!(%hostname, target = %url, "serving proxy script");

        match self.proxy_script {
            ProxyScriptMode::Forward => self.fetch(url, req).await,
            ProxyScriptMode::Redirect => {
                let mut response = make_error_response(StatusCode::FOUND);
                let location = http::HeaderValue::from_str(url.as_str())
                    .map_err(|e| EdgeError::InternalError(e.to_string()))?;
                response.headers_mut().insert(LOCATION, location);
                Ok(response)
            }
        }
    }

    async fn inject(
        &self,
        req: Request<Incoming>,
        config: &ScriptConfig,
    ) -> Result<Response<EdgeBody>, EdgeError> {
        let response = forward_to_origin(&self.origin_client, &self.origin, req, self.timeout).await?;
        let (mut parts, body) = response.into_parts();
        let body = body.map_err(EdgeError::from).boxed();

        let is_html = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/html"));
        if !is_html {
            return Ok(Response::from_parts(parts, body));
        }

        let snippet = build_scripts(config, &self.vendor.cdn).concat();
        parts.headers.remove(CONTENT_LENGTH);
        let mode = if config.proxy_enabled { "proxy" } else { "direct" };
        counter!(SCRIPTS_INJECTED, "mode" => mode).increment(1);

        Ok(Response::from_parts(parts, InjectBody::new(body, snippet).boxed()))
    }
}

fn respond(result: Result<Response<EdgeBody>, EdgeError>) -> Response<EdgeBody> {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "edge request failed");
        make_error_response(e.status())
    })
}

/// Vendor URL of the proxy script for `hostname`, form-encoded into the query.
fn proxy_script_url(external: &Url, hostname: &str) -> Url {
    let mut url = join_path_and_query(external, "/proxy.js", None);
    url.query_pairs_mut()
        .append_pair("hostname", hostname)
        .append_pair("path", "/simple");
    url
}

/// Host the client addressed, without port.
fn request_hostname<B>(req: &Request<B>) -> Option<String> {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())?;
    let hostname = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };
    Some(hostname.to_string())
}
