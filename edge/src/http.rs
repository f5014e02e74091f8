use crate::errors::EdgeError;
use http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, HOST};
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes, Incoming};
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use shared::http::{add_via_header, filter_hop_by_hop};
use std::time::Duration;
use tokio::time::timeout;
use url::Url;

/// Forwards `request` to the site origin and streams the response back.
///
/// `Accept-Encoding` is dropped so HTML arrives uncompressed and can be
/// rewritten. The timeout covers the response head only; the body streams
/// without a deadline.
pub async fn forward_to_origin<B>(
    client: &Client<HttpConnector, B>,
    origin: &Url,
    request: Request<B>,
    timeout_duration: Duration,
) -> Result<Response<Incoming>, EdgeError>
where
    B: Body + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let upstream_identifier = origin.host_str().unwrap_or(origin.as_str()).to_string();

    let (mut parts, body) = request.into_parts();
    let url = join_path_and_query(origin, parts.uri.path(), parts.uri.query());

    let request_version = parts.version;
    filter_hop_by_hop(&mut parts.headers, request_version);
    add_via_header(&mut parts.headers, request_version);
    parts.headers.remove(ACCEPT_ENCODING);

    let mut req_builder = Request::builder()
        .method(parts.method)
        .uri(url.as_str())
        .version(parts.version);
    for (name, value) in parts.headers.iter() {
        req_builder = req_builder.header(name, value);
    }
    let upstream_request = req_builder
        .body(body)
        .map_err(|e| EdgeError::InternalError(format!("Failed to build request: {e}")))?;

    let response = timeout(timeout_duration, client.request(upstream_request))
        .await
        .map_err(|_| EdgeError::UpstreamTimeout(upstream_identifier.clone()))?
        .map_err(|e| EdgeError::UpstreamRequestFailed(upstream_identifier, e.to_string()))?;

    let (mut parts, body) = response.into_parts();
    let response_version = parts.version;
    filter_hop_by_hop(&mut parts.headers, response_version);
    add_via_header(&mut parts.headers, response_version);

    Ok(Response::from_parts(parts, body))
}

/// Sends `request` to a vendor URL and collects the whole response.
///
/// Method, headers and body of the original request are kept. The timeout
/// covers the complete exchange including the response body, so this is
/// only used for small script and collection requests.
pub async fn fetch_upstream<B>(
    client: &reqwest::Client,
    url: Url,
    request: Request<B>,
    timeout_duration: Duration,
) -> Result<Response<Bytes>, EdgeError>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let upstream_identifier = url.host_str().unwrap_or(url.as_str()).to_string();

    let (mut parts, body) = request.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| EdgeError::RequestBodyError(e.to_string()))?
        .to_bytes();

    let request_version = parts.version;
    filter_hop_by_hop(&mut parts.headers, request_version);
    add_via_header(&mut parts.headers, request_version);
    // Derived from the target URL and body by the client.
    parts.headers.remove(HOST);
    parts.headers.remove(CONTENT_LENGTH);

    let exchange = async {
        let response = client
            .request(parts.method, url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        Ok::<_, reqwest::Error>((status, version, headers, body))
    };

    let (status, version, mut headers, body) = timeout(timeout_duration, exchange)
        .await
        .map_err(|_| EdgeError::UpstreamTimeout(upstream_identifier.clone()))?
        .map_err(|e| {
            if e.is_timeout() {
                EdgeError::UpstreamTimeout(upstream_identifier.clone())
            } else {
                EdgeError::UpstreamRequestFailed(upstream_identifier.clone(), e.to_string())
            }
        })?;

    filter_hop_by_hop(&mut headers, version);
    add_via_header(&mut headers, version);
    // The body is re-sent with its own framing.
    headers.remove(CONTENT_LENGTH);

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = version;
    *response.headers_mut() = headers;
    Ok(response)
}

/// `base` with its path extended by `path`, query replaced by `query`.
pub fn join_path_and_query(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();
    let path = if path.is_empty() { "/" } else { path };
    url.set_path(&format!("{}{}", base.path().trim_end_matches('/'), path));
    url.set_query(query);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{start_echo_server, start_silent_server};
    use http_body_util::Full;
    use hyper_util::rt::TokioExecutor;

    #[test]
    fn test_join_path_and_query() {
        let base = Url::parse("https://queue.simpleanalyticscdn.com").unwrap();
        assert_eq!(
            join_path_and_query(&base, "/events", Some("a=1")).as_str(),
            "https://queue.simpleanalyticscdn.com/events?a=1"
        );
        assert_eq!(
            join_path_and_query(&base, "", None).as_str(),
            "https://queue.simpleanalyticscdn.com/"
        );

        let prefixed = Url::parse("http://127.0.0.1:9000/vendor/").unwrap();
        assert_eq!(
            join_path_and_query(&prefixed, "/x", None).as_str(),
            "http://127.0.0.1:9000/vendor/x"
        );
    }

    #[tokio::test]
    async fn test_forward_to_origin_drops_accept_encoding() {
        let port = start_echo_server().await;
        let client: Client<HttpConnector, Full<Bytes>> =
            Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        let origin = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();

        let request = Request::builder()
            .uri("http://example.com/page?x=1")
            .header("accept-encoding", "gzip")
            .header("connection", "keep-alive")
            .header("x-custom", "kept")
            .body(Full::new(Bytes::new()))
            .unwrap();

        let response = forward_to_origin(&client, &origin, request, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().contains_key("via"));

        let headers = response.headers();
        assert_eq!(headers["x-echo-path"], "/page?x=1");
        assert_eq!(headers["x-echo-x-custom"], "kept");
        assert!(!headers.contains_key("x-echo-accept-encoding"));
    }

    #[tokio::test]
    async fn test_fetch_upstream_keeps_method_and_body() {
        let port = start_echo_server().await;
        let url = Url::parse(&format!("http://127.0.0.1:{port}/events?b=2")).unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("http://example.com/simple/events?b=2")
            .header("x-custom", "kept")
            .body(Full::new(Bytes::from_static(b"payload")))
            .unwrap();

        let response = fetch_upstream(&reqwest::Client::new(), url, request, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.headers()["x-echo-method"], "POST");
        assert_eq!(response.headers()["x-echo-path"], "/events?b=2");
        assert_eq!(response.headers()["x-echo-x-custom"], "kept");
        assert_eq!(response.body().as_ref(), b"payload");
    }

    #[tokio::test]
    async fn test_fetch_upstream_unreachable() {
        // Bind and drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("http://127.0.0.1:{port}/latest.js")).unwrap();
        let request = Request::new(Full::new(Bytes::new()));

        let err = fetch_upstream(&reqwest::Client::new(), url, request, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::UpstreamRequestFailed(..)));
        assert_eq!(err.status(), hyper::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_fetch_upstream_timeout() {
        let port = start_silent_server().await;
        let url = Url::parse(&format!("http://127.0.0.1:{port}/latest.js")).unwrap();
        let request = Request::new(Full::new(Bytes::new()));

        let err = fetch_upstream(&reqwest::Client::new(), url, request, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EdgeError::UpstreamTimeout(_)));
        assert_eq!(err.status(), hyper::StatusCode::GATEWAY_TIMEOUT);
    }
}
