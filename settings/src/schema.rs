//! Declarative description of every setting the extension exposes.
//!
//! Fields are grouped into namespaces. Each field is bound to exactly one
//! environment variable, and its [`Encoding`] describes how a structured value
//! maps onto that variable. The mapping itself lives in [`crate::translator`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable names shared by the settings API and the edge runtime.
pub mod keys {
    pub const TEAM_ENABLED: &str = "SIMPLEANALYTICS_ENABLED";
    pub const ENABLE_ANALYTICS: &str = "ENABLE_SIMPLE_ANALYTICS";
    pub const AUTO_COLLECT_EVENTS: &str = "SIMPLE_ANALYTICS_AUTO_COLLECT_EVENTS";
    pub const PROXY_ENABLED: &str = "SIMPLE_ANALYTICS_PROXY_ENABLED";
    pub const COLLECT_DNT: &str = "SIMPLE_ANALYTICS_DATA_COLLECT_DNT";
    pub const AUTO_COLLECT: &str = "SIMPLE_ANALYTICS_DATA_AUTO_COLLECT";
    pub const IGNORE_PAGES: &str = "SIMPLE_ANALYTICS_DATA_IGNORE_PAGES";
    pub const HOSTNAME: &str = "SIMPLE_ANALYTICS_DATA_HOSTNAME";
    pub const MODE: &str = "SIMPLE_ANALYTICS_DATA_MODE";
    pub const EVENT_COLLECT: &str = "SIMPLE_ANALYTICS_EVENT_DATA_COLLECT";
    pub const EVENT_EXTENSIONS: &str = "SIMPLE_ANALYTICS_EVENT_DATA_EXTENSIONS";
    pub const EVENT_USE_TITLE: &str = "SIMPLE_ANALYTICS_EVENT_DATA_USE_TITLE";
    pub const EVENT_FULL_URLS: &str = "SIMPLE_ANALYTICS_EVENT_DATA_FULL_URLS";

    /// Keys with this prefix become attributes of the main script tag.
    pub const DATA_PREFIX: &str = "SIMPLE_ANALYTICS_DATA_";
    /// Keys with this prefix become attributes of the automated events script tag.
    pub const EVENT_DATA_PREFIX: &str = "SIMPLE_ANALYTICS_EVENT_DATA_";

    /// Whether `key` belongs to this extension.
    pub fn is_extension_key(key: &str) -> bool {
        key.starts_with("SIMPLE_ANALYTICS_") || key == TEAM_ENABLED || key == ENABLE_ANALYTICS
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// A namespace's settings keyed by field name, in declaration order.
pub type Settings = IndexMap<String, SettingValue>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Encoding {
    /// Boolean stored as `marker` while it differs from `default`; the key is
    /// deleted otherwise. Which value counts as the default differs per field.
    Flag { marker: &'static str, default: bool },
    /// Trimmed string. The empty string is stored as an absent key.
    Text,
    /// Number. `default` is stored as an absent key.
    Number { default: f64 },
    /// One boolean member of a comma-joined list shared by several fields.
    /// An absent key means every member is enabled.
    Member { token: &'static str },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Text,
    Number,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "boolean",
            ValueKind::Text => "string",
            ValueKind::Number => "number",
        }
    }
}

/// Value a settings form starts from when nothing has been stored yet.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FormDefault {
    Bool(bool),
    Text(&'static str),
    Number(f64),
}

impl FormDefault {
    pub fn to_value(self) -> SettingValue {
        match self {
            FormDefault::Bool(b) => SettingValue::Bool(b),
            FormDefault::Text(s) => SettingValue::Text(s.to_string()),
            FormDefault::Number(n) => SettingValue::Number(n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub key: &'static str,
    pub encoding: Encoding,
    pub form_default: FormDefault,
}

impl Field {
    pub fn kind(&self) -> ValueKind {
        match self.encoding {
            Encoding::Flag { .. } | Encoding::Member { .. } => ValueKind::Bool,
            Encoding::Text => ValueKind::Text,
            Encoding::Number { .. } => ValueKind::Number,
        }
    }

    /// Value this field decodes to when its key is absent.
    pub fn stored_default(&self) -> SettingValue {
        match self.encoding {
            Encoding::Flag { default, .. } => SettingValue::Bool(default),
            Encoding::Member { .. } => SettingValue::Bool(true),
            Encoding::Text => SettingValue::Text(String::new()),
            Encoding::Number { default } => SettingValue::Number(default),
        }
    }
}

const fn flag(name: &'static str, key: &'static str, marker: &'static str, default: bool) -> Field {
    Field {
        name,
        key,
        encoding: Encoding::Flag { marker, default },
        form_default: FormDefault::Bool(default),
    }
}

const fn text(name: &'static str, key: &'static str, form_default: &'static str) -> Field {
    Field {
        name,
        key,
        encoding: Encoding::Text,
        form_default: FormDefault::Text(form_default),
    }
}

const fn member(name: &'static str, key: &'static str, token: &'static str) -> Field {
    Field {
        name,
        key,
        encoding: Encoding::Member { token },
        form_default: FormDefault::Bool(true),
    }
}

const ENABLE_ANALYTICS: Field = flag("enableAnalytics", keys::ENABLE_ANALYTICS, "true", false);
const COLLECT_AUTOMATED_EVENTS: Field =
    flag("collectAutomatedEvents", keys::AUTO_COLLECT_EVENTS, "false", true);

const ENABLE_PROXY: Field = flag("enableProxy", keys::PROXY_ENABLED, "true", false);
const COLLECT_DO_NOT_TRACK: Field = flag("collectDoNotTrack", keys::COLLECT_DNT, "true", false);
const COLLECT_PAGE_VIEWS: Field = flag("collectPageViews", keys::AUTO_COLLECT, "false", true);
const IGNORED_PAGES: Field = text("ignoredPages", keys::IGNORE_PAGES, "");
const OVERWRITE_DOMAIN: Field = text("overwriteDomain", keys::HOSTNAME, "");
const HASH_MODE: Field = flag("hashMode", keys::MODE, "hash", false);

const COLLECT_DOWNLOADS: Field = member("collectDownloads", keys::EVENT_COLLECT, "downloads");
const COLLECT_EMAIL_CLICKS: Field = member("collectEmailClicks", keys::EVENT_COLLECT, "emails");
const COLLECT_OUTBOUND_LINKS: Field =
    member("collectOutboundLinks", keys::EVENT_COLLECT, "outbound");
const DOWNLOAD_EXTENSIONS: Field = text(
    "downloadExtensions",
    keys::EVENT_EXTENSIONS,
    "pdf,csv,docx,xlsx,zip,doc,xls",
);
const USE_TITLE: Field = flag("useTitle", keys::EVENT_USE_TITLE, "false", true);
const FULL_URLS: Field = flag("fullUrls", keys::EVENT_FULL_URLS, "true", false);

const TEAM_ENABLED: Field = flag("enabled", keys::TEAM_ENABLED, "true", false);

const GENERAL_FIELDS: &[Field] = &[ENABLE_ANALYTICS, COLLECT_AUTOMATED_EVENTS];
const ADVANCED_FIELDS: &[Field] = &[
    ENABLE_PROXY,
    COLLECT_DO_NOT_TRACK,
    COLLECT_PAGE_VIEWS,
    IGNORED_PAGES,
    OVERWRITE_DOMAIN,
    HASH_MODE,
];
const EVENTS_FIELDS: &[Field] = &[
    COLLECT_AUTOMATED_EVENTS,
    COLLECT_DOWNLOADS,
    COLLECT_EMAIL_CLICKS,
    COLLECT_OUTBOUND_LINKS,
    DOWNLOAD_EXTENSIONS,
    USE_TITLE,
    FULL_URLS,
];
const TEAM_FIELDS: &[Field] = &[TEAM_ENABLED];
const DO_NOT_TRACK_FIELDS: &[Field] = &[COLLECT_DO_NOT_TRACK];
const IGNORE_PAGES_FIELDS: &[Field] = &[IGNORED_PAGES];
const OVERWRITE_DOMAIN_FIELDS: &[Field] = &[OVERWRITE_DOMAIN];
const HASH_MODE_FIELDS: &[Field] = &[HASH_MODE];
const COLLECT_PAGE_VIEWS_FIELDS: &[Field] = &[COLLECT_PAGE_VIEWS];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    General,
    Advanced,
    Events,
    Team,
    DoNotTrack,
    IgnorePages,
    OverwriteDomain,
    HashMode,
    CollectPageViews,
}

/// Whether a namespace's variables belong to a site or to the whole account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeKind {
    Site,
    Team,
}

impl Namespace {
    pub const ALL: &'static [Namespace] = &[
        Namespace::General,
        Namespace::Advanced,
        Namespace::Events,
        Namespace::Team,
        Namespace::DoNotTrack,
        Namespace::IgnorePages,
        Namespace::OverwriteDomain,
        Namespace::HashMode,
        Namespace::CollectPageViews,
    ];

    /// Namespaces that own a section of the stored configuration document.
    const PRIMARY: &'static [Namespace] = &[
        Namespace::General,
        Namespace::Advanced,
        Namespace::Events,
        Namespace::Team,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Namespace::General => "general",
            Namespace::Advanced => "advanced",
            Namespace::Events => "events",
            Namespace::Team => "team",
            Namespace::DoNotTrack => "doNotTrack",
            Namespace::IgnorePages => "ignorePages",
            Namespace::OverwriteDomain => "overwriteDomain",
            Namespace::HashMode => "hashMode",
            Namespace::CollectPageViews => "collectPageViews",
        }
    }

    pub fn fields(self) -> &'static [Field] {
        match self {
            Namespace::General => GENERAL_FIELDS,
            Namespace::Advanced => ADVANCED_FIELDS,
            Namespace::Events => EVENTS_FIELDS,
            Namespace::Team => TEAM_FIELDS,
            Namespace::DoNotTrack => DO_NOT_TRACK_FIELDS,
            Namespace::IgnorePages => IGNORE_PAGES_FIELDS,
            Namespace::OverwriteDomain => OVERWRITE_DOMAIN_FIELDS,
            Namespace::HashMode => HASH_MODE_FIELDS,
            Namespace::CollectPageViews => COLLECT_PAGE_VIEWS_FIELDS,
        }
    }

    pub fn scope_kind(self) -> ScopeKind {
        match self {
            Namespace::Team => ScopeKind::Team,
            _ => ScopeKind::Site,
        }
    }

    /// The first primary namespace declaring a field named `field_name`.
    pub fn owner_of(field_name: &str) -> Option<Namespace> {
        Self::PRIMARY
            .iter()
            .copied()
            .find(|ns| ns.fields().iter().any(|f| f.name == field_name))
    }

    /// The configuration document section that records saves of this
    /// namespace: itself for a primary namespace, otherwise the primary
    /// namespace owning its fields.
    pub fn section(self) -> Namespace {
        if Self::PRIMARY.contains(&self) {
            return self;
        }
        self.fields()
            .first()
            .and_then(|field| Self::owner_of(field.name))
            .unwrap_or(self)
    }

    pub fn form_defaults(self) -> Settings {
        self.fields()
            .iter()
            .map(|f| (f.name.to_string(), f.form_default.to_value()))
            .collect()
    }

    /// Message reported when persisting this namespace fails.
    pub fn save_error_message(self) -> &'static str {
        match self {
            Namespace::Advanced => "Failed to save advanced settings",
            _ => "Failed to save site configuration",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown settings namespace: {0}")]
pub struct UnknownNamespace(pub String);

impl FromStr for Namespace {
    type Err = UnknownNamespace;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .iter()
            .copied()
            .find(|ns| ns.name() == s)
            .ok_or_else(|| UnknownNamespace(s.to_string()))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("expected a JSON object")]
    NotAnObject,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("field {field} must be a {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}

impl ValidationError {
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField(field) => Some(field),
            ValidationError::WrongType { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Checks `input` against `fields` and returns the structured settings.
/// Strings are trimmed and members not declared by `fields` are dropped.
pub fn validate(fields: &[Field], input: &serde_json::Value) -> Result<Settings, ValidationError> {
    let object = input.as_object().ok_or(ValidationError::NotAnObject)?;
    let mut settings = Settings::with_capacity(fields.len());

    for field in fields {
        let raw = object
            .get(field.name)
            .ok_or(ValidationError::MissingField(field.name))?;
        let wrong_type = || ValidationError::WrongType {
            field: field.name,
            expected: field.kind().as_str(),
        };

        let value = match field.kind() {
            ValueKind::Bool => SettingValue::Bool(raw.as_bool().ok_or_else(wrong_type)?),
            ValueKind::Text => {
                SettingValue::Text(raw.as_str().ok_or_else(wrong_type)?.trim().to_string())
            }
            ValueKind::Number => SettingValue::Number(raw.as_f64().ok_or_else(wrong_type)?),
        };
        settings.insert(field.name.to_string(), value);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_every_field_has_one_key() {
        for ns in Namespace::ALL {
            for field in ns.fields() {
                assert!(keys::is_extension_key(field.key), "{}", field.key);
            }
        }
    }

    #[test]
    fn test_namespace_names_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(ns.name().parse::<Namespace>().unwrap(), *ns);
        }
        assert_eq!(
            "billing".parse::<Namespace>(),
            Err(UnknownNamespace("billing".into()))
        );
    }

    #[test]
    fn test_scope_kind() {
        assert_eq!(Namespace::Team.scope_kind(), ScopeKind::Team);
        assert_eq!(Namespace::HashMode.scope_kind(), ScopeKind::Site);
    }

    #[test]
    fn test_owner_of() {
        assert_eq!(
            Namespace::owner_of("collectAutomatedEvents"),
            Some(Namespace::General)
        );
        assert_eq!(Namespace::owner_of("hashMode"), Some(Namespace::Advanced));
        assert_eq!(Namespace::owner_of("fullUrls"), Some(Namespace::Events));
        assert_eq!(Namespace::owner_of("nope"), None);
    }

    #[test]
    fn test_section() {
        assert_eq!(Namespace::Events.section(), Namespace::Events);
        assert_eq!(Namespace::Team.section(), Namespace::Team);
        assert_eq!(Namespace::HashMode.section(), Namespace::Advanced);
        assert_eq!(Namespace::DoNotTrack.section(), Namespace::Advanced);
    }

    #[test]
    fn test_form_defaults() {
        let events = Namespace::Events.form_defaults();
        assert_eq!(
            events["downloadExtensions"],
            SettingValue::Text("pdf,csv,docx,xlsx,zip,doc,xls".into())
        );
        assert_eq!(events["fullUrls"], SettingValue::Bool(false));

        let advanced = Namespace::Advanced.form_defaults();
        let names: Vec<_> = advanced.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "enableProxy",
                "collectDoNotTrack",
                "collectPageViews",
                "ignoredPages",
                "overwriteDomain",
                "hashMode"
            ]
        );
        assert_eq!(advanced["collectPageViews"], SettingValue::Bool(true));
    }

    #[test]
    fn test_validate_trims_and_drops_unknown() {
        let input = json!({
            "enableProxy": true,
            "collectDoNotTrack": false,
            "collectPageViews": true,
            "ignoredPages": "  /admin/*  ",
            "overwriteDomain": "",
            "hashMode": false,
            "somethingElse": 1,
        });

        let settings = validate(Namespace::Advanced.fields(), &input).unwrap();
        assert_eq!(settings.len(), 6);
        assert_eq!(
            settings["ignoredPages"],
            SettingValue::Text("/admin/*".into())
        );
        assert!(!settings.contains_key("somethingElse"));
    }

    #[test]
    fn test_validate_errors() {
        let fields = Namespace::General.fields();

        assert_eq!(
            validate(fields, &json!([true])),
            Err(ValidationError::NotAnObject)
        );
        assert_eq!(
            validate(fields, &json!({"enableAnalytics": true})),
            Err(ValidationError::MissingField("collectAutomatedEvents"))
        );

        let err = validate(
            fields,
            &json!({"enableAnalytics": "yes", "collectAutomatedEvents": true}),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::WrongType {
                field: "enableAnalytics",
                expected: "boolean"
            }
        );
        assert_eq!(err.field(), Some("enableAnalytics"));
    }

    #[test]
    fn test_validate_number() {
        let fields = [Field {
            name: "sampleRate",
            key: "SIMPLE_ANALYTICS_DATA_SAMPLE_RATE",
            encoding: Encoding::Number { default: 100.0 },
            form_default: FormDefault::Number(100.0),
        }];

        let settings = validate(&fields, &json!({"sampleRate": 25})).unwrap();
        assert_eq!(settings["sampleRate"], SettingValue::Number(25.0));

        assert!(validate(&fields, &json!({"sampleRate": "25"})).is_err());
    }
}
