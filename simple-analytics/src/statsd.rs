use crate::config::MetricsConfig;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::{MetricDef, describe_all};

/// Installs the StatsD recorder and registers metric descriptions.
pub fn init_metrics(config: &MetricsConfig, defs: &[MetricDef]) -> Result<(), String> {
    let recorder = StatsdBuilder::from(config.statsd_host.clone(), config.statsd_port)
        .build(Some(&config.prefix))
        .map_err(|e| format!("Failed to build statsd recorder: {e}"))?;
    metrics::set_global_recorder(recorder)
        .map_err(|e| format!("Failed to install metrics recorder: {e}"))?;

    describe_all(defs);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "metrics enabled"
    );
    Ok(())
}
