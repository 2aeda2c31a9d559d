//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional; defaults target the four services running
//! locally on ports 8000-8003.
//!
//! - `BAMAZON_AUTH_URL` - Auth service base URL (default: `http://localhost:8000`)
//! - `BAMAZON_PRODUCTS_URL` - Catalog service base URL (default: `http://localhost:8001`)
//! - `BAMAZON_CART_URL` - Cart service base URL (default: `http://localhost:8002`)
//! - `BAMAZON_ORDERS_URL` - Orders service base URL (default: `http://localhost:8003`)
//! - `BAMAZON_CART_MODE` - `remote` or `local` (default: `remote`)
//! - `BAMAZON_STORAGE_PATH` - Client storage file (default: `.bamazon/storage.json`)
//! - `BAMAZON_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `BAMAZON_CACHE_CAPACITY` - Max entries per lookup cache (default: 1000)
//! - `GEOCODER_URL` - Geocoding API base URL (default: `https://maps.googleapis.com`)
//! - `GEOCODER_API_KEY` - Geocoding API key
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::cart::CartMode;
use crate::gateway::Endpoints;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URLs of the four backend domains
    pub endpoints: Endpoints,
    /// Which cart backend this session uses
    pub cart_mode: CartMode,
    /// File holding the credential and local cart
    pub storage_path: PathBuf,
    /// Timeout applied to every backend request
    pub request_timeout: Duration,
    /// Upper bound on entries in each session-scoped lookup cache
    pub cache_capacity: u64,
    /// Geocoding collaborator configuration
    pub geocoder: GeocoderConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Geocoding API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct GeocoderConfig {
    /// API base URL
    pub base_url: Url,
    /// API key; lookups fail with "not configured" when absent
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for GeocoderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeocoderConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or the geocoder key
    /// looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let endpoints = Endpoints {
            auth: env.url("BAMAZON_AUTH_URL", "http://localhost:8000")?,
            catalog: env.url("BAMAZON_PRODUCTS_URL", "http://localhost:8001")?,
            cart: env.url("BAMAZON_CART_URL", "http://localhost:8002")?,
            orders: env.url("BAMAZON_ORDERS_URL", "http://localhost:8003")?,
        };

        let cart_mode = env.parsed("BAMAZON_CART_MODE", "remote")?;
        let storage_path = PathBuf::from(env.or_default("BAMAZON_STORAGE_PATH", ".bamazon/storage.json"));
        let request_timeout =
            Duration::from_secs(env.parsed::<u64>("BAMAZON_REQUEST_TIMEOUT_SECS", "10")?);
        let cache_capacity = env.parsed("BAMAZON_CACHE_CAPACITY", "1000")?;

        let geocoder = GeocoderConfig {
            base_url: env.url("GEOCODER_URL", "https://maps.googleapis.com")?,
            api_key: env.validated_secret("GEOCODER_API_KEY")?,
        };

        Ok(Self {
            endpoints,
            cart_mode,
            storage_path,
            request_timeout,
            cache_capacity,
            geocoder,
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Get an optional variable, treating blank values as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get and parse a variable with a default value.
    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get a base URL with a default value.
    fn url(&self, key: &str, default: &str) -> Result<Url, ConfigError> {
        let url = self.parsed::<Url>(key, default)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        Ok(url)
    }

    /// Load and validate an optional secret.
    fn validated_secret(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        self.optional(key)
            .map(|value| {
                validate_secret_strength(&value, key)?;
                Ok(SecretString::from(value))
            })
            .transpose()
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoints.auth.as_str(), "http://localhost:8000/");
        assert_eq!(config.endpoints.catalog.port(), Some(8001));
        assert_eq!(config.endpoints.cart.port(), Some(8002));
        assert_eq!(config.endpoints.orders.port(), Some(8003));
        assert_eq!(config.cart_mode, CartMode::Remote);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.cache_capacity, 1000);
        assert!(config.geocoder.api_key.is_none());
        assert!(config.sentry_dsn.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("BAMAZON_CART_MODE", "local"),
            ("BAMAZON_ORDERS_URL", "https://orders.internal:9443"),
            ("BAMAZON_REQUEST_TIMEOUT_SECS", "3"),
            ("BAMAZON_STORAGE_PATH", "/tmp/bz.json"),
        ]))
        .unwrap();

        assert_eq!(config.cart_mode, CartMode::Local);
        assert_eq!(config.endpoints.orders.port(), Some(9443));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.storage_path, PathBuf::from("/tmp/bz.json"));
    }

    #[test]
    fn test_invalid_cart_mode() {
        let err = ClientConfig::from_lookup(lookup(&[("BAMAZON_CART_MODE", "both")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "BAMAZON_CART_MODE"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let err = ClientConfig::from_lookup(lookup(&[("BAMAZON_AUTH_URL", "ftp://auth")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_placeholder_api_key_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[("GEOCODER_API_KEY", "your-api-key-here")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_low_entropy_api_key_rejected() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "GEOCODER_API_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_geocoder_config_debug_redacts_key() {
        let config = ClientConfig::from_lookup(lookup(&[(
            "GEOCODER_API_KEY",
            "AIzaSyB3xY9mK2nL5pQ7rT0uW4zC6dF8gH1jK",
        )]))
        .unwrap();

        let debug_output = format!("{:?}", config.geocoder);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("AIzaSy"));
        assert_eq!(
            config.geocoder.api_key.as_ref().map(ExposeSecret::expose_secret),
            Some("AIzaSyB3xY9mK2nL5pQ7rT0uW4zC6dF8gH1jK")
        );
    }
}
