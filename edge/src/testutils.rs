use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use tokio::net::TcpListener;

pub const HTML_PAGE: &str = "<html><body><h1>hello</h1></body></html>";
pub const JSON_DOCUMENT: &str = r#"{"markup":"</body>"}"#;

/// `/*.html` returns [`HTML_PAGE`], `/*.json` returns [`JSON_DOCUMENT`].
/// Every other path echoes the request body. Responses carry the request
/// method, path and headers as `x-echo-*` headers.
async fn echo_handler(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body_bytes = body
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .unwrap_or_else(|_| Bytes::new());

    let path = parts.uri.path();
    let (content_type, body) = if path.ends_with(".html") {
        ("text/html; charset=utf-8", Bytes::from_static(HTML_PAGE.as_bytes()))
    } else if path.ends_with(".json") {
        ("application/json", Bytes::from_static(JSON_DOCUMENT.as_bytes()))
    } else {
        ("application/octet-stream", body_bytes)
    };

    let mut response = Response::new(Full::new(body));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(method) = HeaderValue::from_str(parts.method.as_str()) {
        headers.insert("x-echo-method", method);
    }
    if let Some(pq) = parts.uri.path_and_query()
        && let Ok(value) = HeaderValue::from_str(pq.as_str())
    {
        headers.insert("x-echo-path", value);
    }
    for (name, value) in parts.headers.iter() {
        if let Ok(echo_name) = HeaderName::from_bytes(format!("x-echo-{name}").as_bytes()) {
            headers.insert(echo_name, value.clone());
        }
    }

    Ok(response)
}

pub async fn start_echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);

            tokio::spawn(async move {
                let _ = Builder::new(TokioExecutor::new())
                    .serve_connection(io, service_fn(echo_handler))
                    .await;
            });
        }
    });

    port
}

/// Accepts connections and never answers.
pub async fn start_silent_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to address");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    port
}
