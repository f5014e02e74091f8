use edge::config::Config as EdgeConfig;
use serde::Deserialize;
use settings::config::Config as SettingsConfig;
use std::fs::File;

fn default_prefix() -> String {
    "simple_analytics".to_string()
}

#[derive(Deserialize, Debug, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub sentry_dsn: Option<String>,
    /// Default filter directives, overridden by `RUST_LOG`.
    #[serde(default)]
    pub filter: Option<String>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub edge: Option<EdgeConfig>,
    pub settings: Option<SettingsConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("config has no `{0}` section")]
    MissingSection(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge::config::ProxyScriptMode;
    use settings::config::StoreConfig;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    #[test]
    fn edge_config() {
        let yaml = r#"
            metrics:
                statsd_host: 127.0.0.1
                statsd_port: 8125
            edge:
                listener:
                    host: 0.0.0.0
                    port: 8080
                admin_listener:
                    host: 127.0.0.1
                    port: 8081
                origin: http://127.0.0.1:3000
                proxy_script: redirect
                site:
                    account_id: team
                    site_id: site
                store:
                    type: process_env
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let metrics = config.common.metrics.expect("metrics config");
        assert_eq!(metrics.prefix, "simple_analytics");
        assert!(config.common.logging.is_none());
        assert!(config.settings.is_none());

        let edge = config.edge.expect("edge config");
        assert_eq!(edge.proxy_script, ProxyScriptMode::Redirect);
        assert_eq!(edge.store, StoreConfig::ProcessEnv);
        edge.validate().expect("valid edge config");
    }

    #[test]
    fn settings_config() {
        let yaml = r#"
            logging:
                sentry_dsn: https://key@sentry.example.com/1
                filter: debug
            settings:
                listener:
                    host: 0.0.0.0
                    port: 3000
                admin_listener:
                    host: 127.0.0.1
                    port: 3001
                store:
                    type: platform
                    api_url: https://api.example.com/api/v1
                    token_env: API_TOKEN
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        let logging = config.common.logging.expect("logging config");
        assert_eq!(logging.filter.as_deref(), Some("debug"));

        let settings = config.settings.expect("settings config");
        assert!(matches!(
            settings.store,
            StoreConfig::Platform { ref token_env, .. } if token_env == "API_TOKEN"
        ));
    }

    #[test]
    fn missing_file() {
        let result = Config::from_file(std::path::Path::new("/nonexistent/config.yaml"));
        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }
}
