//! Builds the vendor `<script>` tags injected into HTML pages.

use settings::schema::keys;
use settings::store::EnvSnapshot;
use url::Url;

/// Configuration the injected markup depends on, resolved from one snapshot
/// of the site's variables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScriptConfig {
    pub team_enabled: bool,
    pub analytics_enabled: bool,
    pub proxy_enabled: bool,
    pub automated_events: bool,
    /// `data-*` attributes of the main script, ordered by key.
    pub attributes: Vec<(String, String)>,
    /// `data-*` attributes of the automated events script, ordered by key.
    pub event_attributes: Vec<(String, String)>,
}

impl ScriptConfig {
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        let mut attributes = Vec::new();
        let mut event_attributes = Vec::new();

        for (key, value) in snapshot.iter() {
            if let Some(rest) = key.strip_prefix(keys::DATA_PREFIX) {
                attributes.push((attribute_name(rest), value.to_string()));
            } else if let Some(rest) = key.strip_prefix(keys::EVENT_DATA_PREFIX) {
                event_attributes.push((attribute_name(rest), value.to_string()));
            }
        }

        ScriptConfig {
            team_enabled: snapshot
                .get(keys::TEAM_ENABLED)
                .is_some_and(|v| !v.is_empty()),
            analytics_enabled: snapshot.get(keys::ENABLE_ANALYTICS) == Some("true"),
            proxy_enabled: snapshot.get(keys::PROXY_ENABLED) == Some("true"),
            automated_events: snapshot.get(keys::AUTO_COLLECT_EVENTS) != Some("false"),
            attributes,
            event_attributes,
        }
    }

    /// Whether the edge handlers act on requests at all.
    pub fn is_active(&self) -> bool {
        self.team_enabled || self.analytics_enabled
    }
}

// DATA_COLLECT_DNT -> data-collect-dnt
fn attribute_name(rest: &str) -> String {
    format!("data-{}", rest.replace('_', "-").to_ascii_lowercase())
}

/// Returns the fragments to insert before `</body>`, in order. Proxy mode
/// points both scripts at same-origin paths, direct mode at `cdn`.
pub fn build_scripts(config: &ScriptConfig, cdn: &Url) -> Vec<String> {
    let (main_src, events_src) = if config.proxy_enabled {
        ("/proxy.js".to_string(), "/auto-events.js".to_string())
    } else {
        (vendor_path(cdn, "/latest.js"), vendor_path(cdn, "/auto-events.js"))
    };

    let mut scripts = vec![script_tag(&main_src, &config.attributes)];
    if config.automated_events {
        scripts.push(script_tag(&events_src, &config.event_attributes));
    }
    scripts
}

/// `base` with `path` appended to its own path.
pub fn vendor_path(base: &Url, path: &str) -> String {
    let mut url = base.clone();
    url.set_path(&format!("{}{}", base.path().trim_end_matches('/'), path));
    url.to_string()
}

fn script_tag(src: &str, attributes: &[(String, String)]) -> String {
    let mut tag = format!(r#"<script async src="{}""#, escape_attribute(src));
    for (name, value) in attributes {
        tag.push_str(&format!(r#" {}="{}""#, name, escape_attribute(value)));
    }
    tag.push_str("></script>");
    tag
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cdn() -> Url {
        Url::parse("https://scripts.simpleanalyticscdn.com").unwrap()
    }

    fn config(pairs: &[(&str, &str)]) -> ScriptConfig {
        ScriptConfig::from_snapshot(&pairs.iter().copied().collect())
    }

    #[test]
    fn test_attributes_from_keys() {
        let config = config(&[
            ("SIMPLE_ANALYTICS_DATA_MODE", "hash"),
            ("SIMPLE_ANALYTICS_DATA_COLLECT_DNT", "true"),
            ("SIMPLE_ANALYTICS_EVENT_DATA_COLLECT", "downloads,emails"),
            ("SIMPLE_ANALYTICS_PROXY_ENABLED", "true"),
            ("UNRELATED", "x"),
        ]);

        assert_eq!(
            config.attributes,
            vec![
                ("data-collect-dnt".to_string(), "true".to_string()),
                ("data-mode".to_string(), "hash".to_string()),
            ]
        );
        assert_eq!(
            config.event_attributes,
            vec![("data-collect".to_string(), "downloads,emails".to_string())]
        );
        assert!(config.proxy_enabled);
        assert!(config.automated_events);
    }

    #[test]
    fn test_activation() {
        assert!(!config(&[]).is_active());
        assert!(config(&[("SIMPLEANALYTICS_ENABLED", "1")]).is_active());
        assert!(!config(&[("SIMPLEANALYTICS_ENABLED", "")]).is_active());
        assert!(config(&[("ENABLE_SIMPLE_ANALYTICS", "true")]).is_active());
        assert!(!config(&[("ENABLE_SIMPLE_ANALYTICS", "yes")]).is_active());
    }

    #[test]
    fn test_direct_mode_with_automated_events() {
        let config = config(&[
            ("SIMPLE_ANALYTICS_DATA_HOSTNAME", "example.com"),
            ("SIMPLE_ANALYTICS_DATA_MODE", "hash"),
            ("SIMPLE_ANALYTICS_EVENT_DATA_FULL_URLS", "true"),
        ]);

        let scripts = build_scripts(&config, &cdn());
        assert_eq!(
            scripts,
            vec![
                r#"<script async src="https://scripts.simpleanalyticscdn.com/latest.js" data-hostname="example.com" data-mode="hash"></script>"#,
                r#"<script async src="https://scripts.simpleanalyticscdn.com/auto-events.js" data-full-urls="true"></script>"#,
            ]
        );
    }

    #[test]
    fn test_proxy_mode_without_automated_events() {
        let config = config(&[
            ("SIMPLE_ANALYTICS_PROXY_ENABLED", "true"),
            ("SIMPLE_ANALYTICS_AUTO_COLLECT_EVENTS", "false"),
            ("SIMPLE_ANALYTICS_DATA_IGNORE_PAGES", "/admin/*"),
        ]);

        assert_eq!(
            build_scripts(&config, &cdn()),
            vec![r#"<script async src="/proxy.js" data-ignore-pages="/admin/*"></script>"#]
        );
    }

    #[test]
    fn test_values_are_escaped() {
        let config = config(&[("SIMPLE_ANALYTICS_DATA_IGNORE_PAGES", r#""><script>"#)]);
        let scripts = build_scripts(&config, &cdn());
        assert!(scripts[0].contains(r#"data-ignore-pages="&quot;&gt;&lt;script&gt;""#));
    }

    #[test]
    fn test_vendor_path_keeps_base_path() {
        let base = Url::parse("http://127.0.0.1:8080/vendor/").unwrap();
        assert_eq!(
            vendor_path(&base, "/latest.js"),
            "http://127.0.0.1:8080/vendor/latest.js"
        );
    }
}
