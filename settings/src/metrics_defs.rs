//! Metrics definitions for the settings API.

use shared::metrics_defs::{MetricDef, MetricType};

pub const SETTINGS_REQUESTS: MetricDef = MetricDef {
    name: "settings.requests",
    metric_type: MetricType::Counter,
    description: "Settings queries and mutations. Tagged with namespace, operation, outcome.",
};

pub const STORE_WRITES: MetricDef = MetricDef {
    name: "settings.store.writes",
    metric_type: MetricType::Counter,
    description: "Environment variable writes applied to the store. Tagged with operation.",
};

pub const ALL_METRICS: &[MetricDef] = &[SETTINGS_REQUESTS, STORE_WRITES];
