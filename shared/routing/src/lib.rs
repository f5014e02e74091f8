#[derive(Debug)]
struct Path {
    segments: Vec<String>,
    has_trailing_splat: bool,
}

impl Path {
    /// Parses a path pattern string into a Path struct
    /// Supports:
    /// - Static segments: "/proxy.js"
    /// - Trailing splat: "/simple/*", or "/*" to match every path
    pub fn parse(path_str: &str) -> Self {
        let mut normalized_path = path_str.trim().trim_matches('/');

        let mut has_trailing_splat = false;
        if normalized_path == "*" {
            has_trailing_splat = true;
            normalized_path = "";
        } else if let Some(stripped) = normalized_path.strip_suffix("/*") {
            has_trailing_splat = true;
            normalized_path = stripped;
        }

        let segments: Vec<String> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path.split('/').map(String::from).collect()
        };

        Path {
            segments,
            has_trailing_splat,
        }
    }

    /// Matches a request path against this path pattern.
    /// Returns the unmatched remainder of the path.
    fn matches<'a>(&self, request_path: &'a str) -> Option<&'a str> {
        let mut rest = request_path;

        for seg in self.segments.iter() {
            let stripped = rest.strip_prefix('/').unwrap_or(rest);
            let end = stripped.find('/').unwrap_or(stripped.len());
            let req_segment = &stripped[..end];
            if req_segment.is_empty() || req_segment != seg.as_str() {
                return None;
            }
            rest = &stripped[end..];
        }

        // Without a splat only a trailing slash may remain.
        if self.has_trailing_splat || rest.trim_matches('/').is_empty() {
            Some(rest)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    /// Part of the request path not consumed by the pattern, with its leading
    /// slash. Empty when the pattern consumed the whole path.
    pub rest: &'a str,
    pub action: &'a A,
}

#[derive(Debug)]
pub struct Route<A> {
    path: Path,
    action: A,
}

impl<A> Route<A> {
    pub fn new(path: &str, action: A) -> Self {
        Self {
            path: Path::parse(path),
            action,
        }
    }

    /// Returns Some(RouteMatch) if the request path matches this route, None otherwise.
    pub fn matches<'a>(&'a self, request_path: &'a str) -> Option<RouteMatch<'a, A>> {
        let rest = self.path.matches(request_path)?;
        Some(RouteMatch {
            rest,
            action: &self.action,
        })
    }
}

/// Ordered route table; the first matching route wins.
#[derive(Debug)]
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> RouteTable<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    pub fn resolve<'a, B>(&'a self, request: &'a http::Request<B>) -> Option<RouteMatch<'a, A>> {
        self.resolve_path(request.uri().path())
    }

    pub fn resolve_path<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a, A>> {
        self.routes.iter().find_map(|route| route.matches(path))
    }
}
