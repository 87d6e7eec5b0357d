//! Configuration manager for the WebFinger responder.
//!
//! Everything is read once from the environment at startup. A
//! [`Configuration`] can only be obtained through validation, so handlers
//! never have to check its format again.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, LazyLock};

use axum::extract::FromRef;
use regex_lite::Regex;

use crate::AppState;

pub const RESOURCE_VAR: &str = "WEBFINGER_RESOURCE";
pub const ISSUER_URL_VAR: &str = "WEBFINGER_ISSUER_URL";
pub const ALLOW_DOMAIN_WILDCARD_VAR: &str = "WEBFINGER_ALLOW_DOMAIN_WILDCARD";
pub const PORT_VAR: &str = "PORT";
pub const METRICS_PORT_VAR: &str = "METRICS_PORT";

pub const DEFAULT_PORT: u16 = 8080;

/// `acct:user@domain.tld`, capturing the domain.
static ACCT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^acct:[a-zA-Z0-9._%+-]+@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})$")
        .expect("acct regex must compile")
});

static ISSUER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/$.?#][^\s]*$")
        .expect("issuer url regex must compile")
});

/// Returns the domain of an `acct:` URI, or `None` if `resource` is not one.
pub fn extract_domain(resource: &str) -> Option<&str> {
    ACCT.captures(resource)
        .and_then(|captures| captures.get(1))
        .map(|domain| domain.as_str())
}

/// Environment value a [`ConfigError`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Resource,
    IssuerUrl,
    Port,
    MetricsPort,
}

impl Field {
    /// Name of the environment variable holding the field.
    pub fn var(&self) -> &'static str {
        match self {
            Field::Resource => RESOURCE_VAR,
            Field::IssuerUrl => ISSUER_URL_VAR,
            Field::Port => PORT_VAR,
            Field::MetricsPort => METRICS_PORT_VAR,
        }
    }

    fn expected(&self) -> &'static str {
        match self {
            Field::Resource => "in the format acct:user@domain.com",
            Field::IssuerUrl => "a valid http(s) URL",
            Field::Port | Field::MetricsPort => "a valid port number",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.var())
    }
}

/// Startup configuration failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(Field),
    #[error("{0} is not {expected}", expected = .0.expected())]
    Malformed(Field),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Validated, immutable WebFinger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    resource: String,
    issuer_url: String,
    allow_domain_wildcard: bool,
}

impl Configuration {
    /// Build a configuration from explicit values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if `resource` is not an
    /// `acct:user@domain.tld` URI or `issuer_url` is not an http(s) URL
    /// with a host.
    pub fn new(
        resource: impl Into<String>,
        issuer_url: impl Into<String>,
        allow_domain_wildcard: bool,
    ) -> Result<Self> {
        let resource = resource.into();
        let issuer_url = issuer_url.into();

        if !ACCT.is_match(&resource) {
            return Err(ConfigError::Malformed(Field::Resource));
        }
        if !ISSUER_URL.is_match(&issuer_url) {
            return Err(ConfigError::Malformed(Field::IssuerUrl));
        }

        Ok(Self {
            resource,
            issuer_url,
            allow_domain_wildcard,
        })
    }

    /// Read the configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// Presence of both required values is checked before their format.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resource = required(&lookup, Field::Resource)?;
        let issuer_url = required(&lookup, Field::IssuerUrl)?;
        let allow_domain_wildcard =
            parse_wildcard(lookup(ALLOW_DOMAIN_WILDCARD_VAR).as_deref());

        Self::new(resource, issuer_url, allow_domain_wildcard)
    }

    /// Canonical `acct:` resource served by this instance.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// OpenID Connect issuer advertised to clients.
    pub fn issuer_url(&self) -> &str {
        &self.issuer_url
    }

    /// Whether any account at the configured domain is served.
    pub fn allow_domain_wildcard(&self) -> bool {
        self.allow_domain_wildcard
    }

    /// Skip validation. Only used to reach the defensive branches.
    #[cfg(test)]
    pub(crate) fn unchecked(
        resource: &str,
        issuer_url: &str,
        allow_domain_wildcard: bool,
    ) -> Self {
        Self {
            resource: resource.into(),
            issuer_url: issuer_url.into(),
            allow_domain_wildcard,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

/// Listener settings, kept apart from the WebFinger answer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub port: u16,
    pub metrics_port: Option<u16>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            metrics_port: None,
        }
    }
}

impl ServerSettings {
    /// Read listener settings from the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Read listener settings through `lookup`.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = optional_port(&lookup, Field::Port)?.unwrap_or(DEFAULT_PORT);
        let metrics_port = optional_port(&lookup, Field::MetricsPort)?;

        Ok(Self { port, metrics_port })
    }

    /// Public listening address.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }

    /// Prometheus listening address, if enabled.
    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_port
            .map(|port| SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }
}

fn required<F>(lookup: &F, field: Field) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(field.var())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn optional_port<F>(lookup: &F, field: Field) -> Result<Option<u16>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(field.var()).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse::<u16>()
            .map(Some)
            .map_err(|_| ConfigError::Malformed(field)),
        None => Ok(None),
    }
}

/// Only the two exact literals enable the wildcard.
fn parse_wildcard(value: Option<&str>) -> bool {
    matches!(value, Some("true" | "TRUE"))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(
        pairs: &[(&str, &str)],
    ) -> impl Fn(&str) -> Option<String> + use<> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn valid_env(wildcard: Option<&str>) -> impl Fn(&str) -> Option<String> {
        let mut pairs = vec![
            (RESOURCE_VAR, "acct:user@example.com"),
            (ISSUER_URL_VAR, "https://example.com"),
        ];
        if let Some(value) = wildcard {
            pairs.push((ALLOW_DOMAIN_WILDCARD_VAR, value));
        }
        env(&pairs)
    }

    #[test]
    fn test_load_valid() {
        let config = Configuration::load_with(valid_env(None)).unwrap();
        assert_eq!(config.resource(), "acct:user@example.com");
        assert_eq!(config.issuer_url(), "https://example.com");
        assert!(!config.allow_domain_wildcard());
    }

    #[test]
    fn test_missing_values() {
        let err = Configuration::load_with(env(&[(
            ISSUER_URL_VAR,
            "https://example.com",
        )]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(Field::Resource));

        let err = Configuration::load_with(env(&[(
            RESOURCE_VAR,
            "acct:user@example.com",
        )]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(Field::IssuerUrl));

        // Empty counts as unset.
        let err = Configuration::load_with(env(&[
            (RESOURCE_VAR, ""),
            (ISSUER_URL_VAR, "https://example.com"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing(Field::Resource));
    }

    #[test]
    fn test_presence_checked_before_format() {
        let err =
            Configuration::load_with(env(&[(RESOURCE_VAR, "invalid-resource")]))
                .unwrap_err();
        assert_eq!(err, ConfigError::Missing(Field::IssuerUrl));
    }

    #[test]
    fn test_malformed_resource() {
        for resource in [
            "invalid-resource",
            "acct:us<er@example.com",
            "acct:user@example",
            "acct:user@example.c",
            "acct:@example.com",
            "user@example.com",
            "acct:user@example.com ",
        ] {
            assert_eq!(
                Configuration::new(resource, "https://example.com", false),
                Err(ConfigError::Malformed(Field::Resource)),
                "{resource} should be rejected"
            );
        }
    }

    #[test]
    fn test_valid_resource() {
        for resource in [
            "acct:user@example.com",
            "acct:first.last+tag@sub.example.co.uk",
            "acct:a_b%c-d@my-host.io",
        ] {
            assert!(
                Configuration::new(resource, "https://example.com", false)
                    .is_ok(),
                "{resource} should be accepted"
            );
        }
    }

    #[test]
    fn test_issuer_url() {
        for url in [
            "invalid-url",
            "http://.example.com",
            "ftp://example.com",
            "https://",
            "https:///path",
            "https://exa mple.com",
        ] {
            assert_eq!(
                Configuration::new("acct:user@example.com", url, false),
                Err(ConfigError::Malformed(Field::IssuerUrl)),
                "{url} should be rejected"
            );
        }

        for url in [
            "https://example.com",
            "http://localhost:8080",
            "https://example.com/issuer",
            "https://auth.example.com/realms/main?x=1",
        ] {
            assert!(
                Configuration::new("acct:user@example.com", url, false).is_ok(),
                "{url} should be accepted"
            );
        }
    }

    #[test]
    fn test_wildcard_flag() {
        for (value, expected) in [
            (Some("true"), true),
            (Some("TRUE"), true),
            (Some("True"), false),
            (Some("false"), false),
            (Some("1"), false),
            (Some("yes"), false),
            (Some(""), false),
            (None, false),
        ] {
            let config = Configuration::load_with(valid_env(value)).unwrap();
            assert_eq!(
                config.allow_domain_wildcard(),
                expected,
                "{value:?}"
            );
        }
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("acct:user@example.com"),
            Some("example.com")
        );
        assert_eq!(
            extract_domain("acct:other@sub.example.org"),
            Some("sub.example.org")
        );
        assert_eq!(extract_domain("acct:invalid"), None);
        assert_eq!(extract_domain("https://example.com"), None);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::Missing(Field::Resource).to_string(),
            "WEBFINGER_RESOURCE environment variable not set"
        );
        assert_eq!(
            ConfigError::Malformed(Field::Resource).to_string(),
            "WEBFINGER_RESOURCE is not in the format acct:user@domain.com"
        );
        assert_eq!(
            ConfigError::Malformed(Field::IssuerUrl).to_string(),
            "WEBFINGER_ISSUER_URL is not a valid http(s) URL"
        );
    }

    #[test]
    fn test_server_settings() {
        let settings = ServerSettings::load_with(env(&[])).unwrap();
        assert_eq!(settings, ServerSettings::default());
        assert_eq!(settings.address().port(), DEFAULT_PORT);
        assert_eq!(settings.metrics_address(), None);

        let settings = ServerSettings::load_with(env(&[
            (PORT_VAR, "3000"),
            (METRICS_PORT_VAR, "9090"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.metrics_address().map(|a| a.port()), Some(9090));

        assert_eq!(
            ServerSettings::load_with(env(&[(PORT_VAR, "http")])),
            Err(ConfigError::Malformed(Field::Port))
        );
        assert_eq!(
            ServerSettings::load_with(env(&[(METRICS_PORT_VAR, "70000")])),
            Err(ConfigError::Malformed(Field::MetricsPort))
        );
    }
}
