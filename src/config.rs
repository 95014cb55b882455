use std::fmt;
use std::time::Duration;

use thiserror::Error;
use zeroize::Zeroizing;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Process configuration. Built once at startup and handed to constructors.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Upstream base URL without a trailing slash, e.g. `https://allure.example.com`.
    pub base_url: String,
    /// API path prefix, always starting and ending with `/`, e.g. `/api/rs/`.
    pub api_prefix: String,
    /// Long-lived API token exchanged for short-lived bearer tokens.
    pub api_token: Zeroizing<String>,
    pub project_id: String,
    /// Deadline for token exchange, launch listing and report generation.
    pub metadata_timeout: Duration,
    /// Deadline for report downloads.
    pub download_timeout: Duration,
    /// Allowed CORS origins. `*` allows any origin.
    pub cors_origins: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("api_prefix", &self.api_prefix)
            .field("api_token", &mask_secret(&self.api_token))
            .field("project_id", &self.project_id)
            .field("metadata_timeout", &self.metadata_timeout)
            .field("download_timeout", &self.download_timeout)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl Config {
    /// Builds a configuration from an arbitrary variable lookup.
    ///
    /// All four upstream values are mandatory; every missing one is reported
    /// in a single [`ConfigError::Missing`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_url = get("ALLURE_BASE_URL");
        let api_prefix = get("ALLURE_API_URL");
        let api_token = get("ALLURE_API_TOKEN");
        let project_id = get("ALLURE_PROJECT_ID");

        let missing: Vec<&'static str> = [
            ("ALLURE_BASE_URL", base_url.is_none()),
            ("ALLURE_API_URL", api_prefix.is_none()),
            ("ALLURE_API_TOKEN", api_token.is_none()),
            ("ALLURE_PROJECT_ID", project_id.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        let (Some(base_url), Some(api_prefix), Some(api_token), Some(project_id)) =
            (base_url, api_prefix, api_token, project_id)
        else {
            return Err(ConfigError::Missing(missing));
        };

        let parsed = url::Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            var: "ALLURE_BASE_URL",
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                var: "ALLURE_BASE_URL",
                reason: "not an absolute http(s) URL".into(),
            });
        }

        let port = match get("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                var: "SERVER_PORT",
                reason: format!("'{}' is not a valid port", raw),
            })?,
            None => DEFAULT_PORT,
        };

        let secs = |var: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match get(var) {
                Some(raw) => raw
                    .parse::<u64>()
                    .ok()
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| ConfigError::Invalid {
                        var,
                        reason: format!("'{}' is not a positive number of seconds", raw),
                    }),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let cors_origins = get("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|| "*".into())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Config {
            port,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: normalize_prefix(&api_prefix),
            api_token: Zeroizing::new(api_token),
            project_id,
            metadata_timeout: secs("ALLURE_METADATA_TIMEOUT_SECS", DEFAULT_METADATA_TIMEOUT_SECS)?,
            download_timeout: secs("ALLURE_DOWNLOAD_TIMEOUT_SECS", DEFAULT_DOWNLOAD_TIMEOUT_SECS)?,
            cors_origins,
        })
    }
}

/// Seeds the process environment from `.env` when one exists.
///
/// Must run before logging is initialised so `.env` can carry the log settings.
/// Returns whether a file was loaded.
pub fn load_dotenv() -> bool {
    dotenvy::dotenv().is_ok()
}

/// Reads the process environment. Call [`load_dotenv`] first.
pub fn load() -> anyhow::Result<Config> {
    Ok(Config::from_lookup(|key| std::env::var(key).ok())?)
}

const DEFAULT_LOG_FILTER: &str = "allure_service=debug,tower_http=debug";

/// Logging and tracing export settings, read before [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl LogSettings {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            filter: get("RUST_LOG").unwrap_or_else(|| DEFAULT_LOG_FILTER.into()),
            json: get("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
            otlp_endpoint: get("OTEL_EXPORTER_OTLP_ENDPOINT"),
        }
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Masks a secret for diagnostics, keeping at most the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() > 12 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}…{}", head, tail)
    } else {
        "****".to_string()
    }
}
