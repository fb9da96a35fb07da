//! Configuration module for the lectern application.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `LECTERN_`-prefixed environment variables (highest precedence).

use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::portal::HttpSettings;
use crate::portal::detail::DEFAULT_DETAIL_CONCURRENCY;
use crate::portal::pagination::DEFAULT_PAGE_FIELD;
use crate::portal::rows::DEFAULT_TABLE_SELECTOR;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "lectern.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Log level for the application
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    pub log_level: String,
    /// Upper bound on detail pages fetched at once
    pub detail_concurrency: usize,
    /// Zone the listing's wall-clock times are in, used for epoch timestamps
    pub timezone: Tz,
    /// CSS selector of the lecture table
    pub table_selector: String,
    /// Page-number field used when the page gives no usable hint
    pub page_field_fallback: String,
    pub user_agent: Option<String>,
    /// Raw `Cookie` header forwarded with every request
    pub cookie: Option<String>,
    /// Per-request timeout, e.g. `30s` or `2m`. Unset leaves the transport default.
    #[serde(deserialize_with = "deserialize_optional_duration", skip_serializing)]
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            detail_concurrency: DEFAULT_DETAIL_CONCURRENCY,
            timezone: chrono_tz::Asia::Shanghai,
            table_selector: DEFAULT_TABLE_SELECTOR.to_string(),
            page_field_fallback: DEFAULT_PAGE_FIELD.to_string(),
            user_agent: Some(concat!("lectern/", env!("CARGO_PKG_VERSION")).to_string()),
            cookie: None,
            request_timeout: None,
        }
    }
}

impl Config {
    /// Provider stack: defaults, then `path` (if it exists), then the environment.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LECTERN_"))
    }

    pub fn load(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            user_agent: self.user_agent.clone(),
            cookie: self.cookie.clone(),
            timeout: self.request_timeout,
        }
    }
}

/// Accepts either integer seconds or a human duration string (`30s`, `1.5m`).
fn deserialize_optional_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Seconds(u64),
        Text(String),
    }

    let raw = Option::<RawDuration>::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawDuration::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(RawDuration::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(RawDuration::Text(text)) => {
            let parsed = DurationParser::with_all_time_units()
                .parse(text.trim())
                .map_err(|e| serde::de::Error::custom(format!("invalid duration `{text}`: {e}")))?;
            Duration::try_from(parsed)
                .map(Some)
                .map_err(|e| serde::de::Error::custom(format!("invalid duration `{text}`: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_without_file_or_env() {
        Jail::expect_with(|_jail| {
            let config = Config::load(Path::new("missing.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.log_level, "info");
            assert_eq!(config.detail_concurrency, 5);
            assert_eq!(config.timezone, chrono_tz::Asia::Shanghai);
            assert_eq!(config.table_selector, "table");
            assert_eq!(config.page_field_fallback, "pageNo");
            assert!(config.request_timeout.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "lectern.toml",
                r#"
                    detail_concurrency = 8
                    timezone = "UTC"
                    request_timeout = "30s"
                    log_level = "debug"
                "#,
            )?;
            jail.set_env("LECTERN_DETAIL_CONCURRENCY", "2");

            let config = Config::load(Path::new("lectern.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.detail_concurrency, 2);
            assert_eq!(config.timezone, chrono_tz::UTC);
            assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
            assert_eq!(config.log_level, "debug");
            Ok(())
        });
    }

    #[test]
    fn test_integer_timeout_is_seconds() {
        Jail::expect_with(|jail| {
            jail.set_env("LECTERN_REQUEST_TIMEOUT", "12");
            let config = Config::load(Path::new("none.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.request_timeout, Some(Duration::from_secs(12)));
            Ok(())
        });
    }

    #[test]
    fn test_http_settings_carry_cookie() {
        let config = Config {
            cookie: Some("JSESSIONID=abc".to_string()),
            ..Config::default()
        };
        let settings = config.http_settings();
        assert_eq!(settings.cookie.as_deref(), Some("JSESSIONID=abc"));
        assert!(settings.user_agent.unwrap().starts_with("lectern/"));
    }
}
