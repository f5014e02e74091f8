use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "edge.request.duration",
    metric_type: MetricType::Histogram,
    description: "Edge request duration in seconds. Tagged with route, status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "edge.requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of edge requests currently being processed",
};

pub const SCRIPTS_INJECTED: MetricDef = MetricDef {
    name: "edge.scripts.injected",
    metric_type: MetricType::Counter,
    description: "HTML responses wrapped for script injection. Tagged with mode.",
};

pub const CONFIG_RESOLUTION_FAILED: MetricDef = MetricDef {
    name: "edge.config.resolution_failed",
    metric_type: MetricType::Counter,
    description: "Requests passed through because the site configuration could not be loaded",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    SCRIPTS_INJECTED,
    CONFIG_RESOLUTION_FAILED,
];
