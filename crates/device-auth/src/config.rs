//! Token authentication configuration.
//!
//! Configuration is loaded once at process start, either from a config
//! document (`serde`) or from `OAUTH_*` environment variables, and is
//! immutable afterwards. A blank algorithm is normalized to
//! [`DEFAULT_ALGORITHM`] before any token is verified.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// The one signing algorithm this deployment accepts.
pub const DEFAULT_ALGORITHM: &str = "RS256";

/// Default clock skew tolerance for `exp` and `nbf` (seconds).
pub const DEFAULT_CLOCK_SKEW_SECONDS: u64 = 60;

/// Upper bound on clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 600;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default timeout for a single JWKS fetch.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Minimum spacing between refetches triggered by an unknown `kid`.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 30;

/// Bearer-token authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenConfig {
    /// Whether bearer-token authentication is active at all.
    pub enabled: bool,

    /// Whether the caller may also accept basic authentication.
    /// Informational here; enforced by the endpoint layer.
    pub allow_basic_auth: bool,

    /// Required `iss` claim, if configured.
    #[serde(deserialize_with = "non_blank")]
    pub issuer: Option<String>,

    /// Required `aud` claim, if configured.
    #[serde(deserialize_with = "non_blank")]
    pub audience: Option<String>,

    /// JWKS endpoint of the trusted identity provider.
    #[serde(deserialize_with = "non_blank")]
    pub jwks_url: Option<String>,

    /// Accepted signing algorithm name.
    pub algorithm: String,

    /// Leeway applied to `exp` and `nbf`.
    pub clock_skew_seconds: u64,

    /// How long a fetched key set is served from cache.
    pub jwks_cache_ttl_seconds: u64,

    /// Request timeout for one JWKS fetch.
    pub jwks_fetch_timeout_seconds: u64,

    /// Minimum spacing between unknown-`kid` refetches.
    pub jwks_min_refresh_interval_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allow_basic_auth: true,
            issuer: None,
            audience: None,
            jwks_url: None,
            algorithm: DEFAULT_ALGORITHM.to_string(),
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            jwks_cache_ttl_seconds: DEFAULT_JWKS_CACHE_TTL_SECONDS,
            jwks_fetch_timeout_seconds: DEFAULT_JWKS_FETCH_TIMEOUT_SECONDS,
            jwks_min_refresh_interval_seconds: DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid boolean for {0}: {1}")]
    InvalidBool(String, String),

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),
}

impl TokenConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let enabled = parse_bool(vars, "OAUTH_ENABLED", defaults.enabled)?;
        let allow_basic_auth =
            parse_bool(vars, "OAUTH_ALLOW_BASIC_AUTH", defaults.allow_basic_auth)?;

        let issuer = non_blank_var(vars, "OAUTH_ISSUER");
        let audience = non_blank_var(vars, "OAUTH_AUDIENCE");
        let jwks_url = non_blank_var(vars, "OAUTH_JWKS_URL");

        let algorithm = vars
            .get("OAUTH_ALGORITHM")
            .cloned()
            .unwrap_or(defaults.algorithm);

        // Negative values fail the u64 parse, so the >= 0 invariant holds by type.
        let clock_skew_seconds = if let Some(value_str) = vars.get("OAUTH_CLOCK_SKEW_SECONDS") {
            value_str.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "OAUTH_CLOCK_SKEW_SECONDS must be a non-negative integer, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            defaults.clock_skew_seconds
        };

        if clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(ConfigError::InvalidClockSkew(format!(
                "OAUTH_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW_SECONDS, clock_skew_seconds
            )));
        }

        let jwks_cache_ttl_seconds = parse_positive_seconds(
            vars,
            "OAUTH_JWKS_CACHE_TTL_SECONDS",
            defaults.jwks_cache_ttl_seconds,
        )?;
        let jwks_fetch_timeout_seconds = parse_positive_seconds(
            vars,
            "OAUTH_JWKS_FETCH_TIMEOUT_SECONDS",
            defaults.jwks_fetch_timeout_seconds,
        )?;
        let jwks_min_refresh_interval_seconds = parse_positive_seconds(
            vars,
            "OAUTH_JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            defaults.jwks_min_refresh_interval_seconds,
        )?;

        let config = TokenConfig {
            enabled,
            allow_basic_auth,
            issuer,
            audience,
            jwks_url,
            algorithm,
            clock_skew_seconds,
            jwks_cache_ttl_seconds,
            jwks_fetch_timeout_seconds,
            jwks_min_refresh_interval_seconds,
        }
        .normalized();

        config.validate()?;
        Ok(config)
    }

    /// Apply the blank-algorithm default.
    ///
    /// Documents deserialized through `serde` must pass through this before
    /// use; [`TokenConfig::from_vars`] does it already.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.algorithm.trim().is_empty() {
            self.algorithm = DEFAULT_ALGORITHM.to_string();
        }
        self
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the feature is enabled without a JWKS URL,
    /// the URL does not parse, the clock skew exceeds
    /// [`MAX_CLOCK_SKEW_SECONDS`], or a hardening duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.jwks_url.as_deref() {
            Some(url) => {
                reqwest::Url::parse(url).map_err(|e| {
                    ConfigError::InvalidJwks(format!("OAUTH_JWKS_URL is not a valid URL: {}", e))
                })?;
            }
            None if self.enabled => {
                return Err(ConfigError::MissingEnvVar("OAUTH_JWKS_URL".to_string()));
            }
            None => {}
        }

        if self.clock_skew_seconds > MAX_CLOCK_SKEW_SECONDS {
            return Err(ConfigError::InvalidClockSkew(format!(
                "clock skew must not exceed {} seconds, got {}",
                MAX_CLOCK_SKEW_SECONDS, self.clock_skew_seconds
            )));
        }

        if self.jwks_cache_ttl_seconds == 0
            || self.jwks_fetch_timeout_seconds == 0
            || self.jwks_min_refresh_interval_seconds == 0
        {
            return Err(ConfigError::InvalidJwks(
                "JWKS durations must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the configured algorithm is the one this deployment accepts.
    pub fn algorithm_supported(&self) -> bool {
        self.algorithm.eq_ignore_ascii_case(DEFAULT_ALGORITHM)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds)
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    pub fn jwks_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.jwks_fetch_timeout_seconds)
    }

    pub fn jwks_min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.jwks_min_refresh_interval_seconds)
    }
}

fn non_blank_var(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidBool(name.to_string(), v)),
    }
}

fn parse_positive_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidJwks(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidJwks(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

fn non_blank<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
