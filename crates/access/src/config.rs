//! Access layer configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `HOMEPLATE_BACKEND_URL` - Base URL of the backend service (e.g., `https://abc.backend.example`)
//! - `HOMEPLATE_BACKEND_KEY` - Backend service-role key sent as `apikey` and as the bearer
//!   token on table reads (high entropy, not a placeholder). Role lookups read other users'
//!   `profiles` and application rows, so a public anon key behind row-level security would
//!   see no rows and every user would resolve as `ProfileMissing`.
//!
//! ## Optional
//! - `HOMEPLATE_LOOKUP_TIMEOUT_MS` - Bound on each backend lookup (default: 5000)
//! - `HOMEPLATE_ROLE_CACHE_TTL_SECS` - Upper bound on a cached role (default: 3600, at most one week)
//! - `HOMEPLATE_AUTH_PATH` - Where unauthenticated users are sent (default: /auth)
//! - `HOMEPLATE_PENDING_PATH` - Application status notice (default: /application-status)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use homeplate_core::Role;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Longest role cache lifetime accepted from the environment (one week).
const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 3_600;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Access layer configuration.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Backend service connection
    pub backend: BackendConfig,
    /// Role lookup tuning
    pub resolver: ResolverSettings,
    /// Redirect destinations used by the gate
    pub redirects: RedirectTargets,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Backend service connection settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct BackendConfig {
    /// Base URL of the backend service
    pub base_url: Url,
    /// Service-role key sent with every request; must be allowed to read
    /// every user's profile and application rows
    pub api_key: SecretString,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Tuning for [`RoleResolver`](crate::resolver::RoleResolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Bound on each external lookup; expiry counts as a failed resolution.
    pub lookup_timeout: Duration,
    /// Upper bound on how long a resolved role stays cached.
    pub cache_ttl: Duration,
    /// Maximum number of identities kept in the cache.
    pub cache_capacity: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(5),
            cache_ttl: Duration::from_secs(60 * 60),
            cache_capacity: 1_000,
        }
    }
}

/// Paths the gate redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTargets {
    /// Sign-in prompt.
    pub auth_path: String,
    /// Informational page for pending or rejected applications.
    pub pending_path: String,
    role_homes: HashMap<Role, String>,
}

impl Default for RedirectTargets {
    fn default() -> Self {
        let role_homes = Role::ALL
            .into_iter()
            .map(|role| (role, default_role_home(role).to_owned()))
            .collect();

        Self {
            auth_path: "/auth".to_owned(),
            pending_path: "/application-status".to_owned(),
            role_homes,
        }
    }
}

impl RedirectTargets {
    /// Landing page for a role.
    #[must_use]
    pub fn role_home(&self, role: Role) -> &str {
        self.role_homes
            .get(&role)
            .map_or_else(|| default_role_home(role), String::as_str)
    }

    /// Override the landing page for a role.
    #[must_use]
    pub fn with_role_home(mut self, role: Role, path: impl Into<String>) -> Self {
        self.role_homes.insert(role, path.into());
        self
    }
}

const fn default_role_home(role: Role) -> &'static str {
    match role {
        Role::Customer => "/",
        Role::Chef => "/chef/dashboard",
        Role::KitchenPartner => "/kitchen-partner/dashboard",
        Role::Restaurant => "/restaurant/dashboard",
        Role::Admin => "/admin",
    }
}

impl AccessConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig::from_env()?;

        let lookup_timeout_ms: u64 = get_parsed_or_default("HOMEPLATE_LOOKUP_TIMEOUT_MS", 5_000)?;
        let cache_ttl = cache_ttl_from_secs(get_parsed_or_default(
            "HOMEPLATE_ROLE_CACHE_TTL_SECS",
            3_600,
        )?)?;
        if lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "HOMEPLATE_LOOKUP_TIMEOUT_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let resolver = ResolverSettings {
            lookup_timeout: Duration::from_millis(lookup_timeout_ms),
            cache_ttl,
            ..ResolverSettings::default()
        };

        let mut redirects = RedirectTargets::default();
        if let Some(path) = get_optional_env("HOMEPLATE_AUTH_PATH") {
            redirects.auth_path = validate_path("HOMEPLATE_AUTH_PATH", path)?;
        }
        if let Some(path) = get_optional_env("HOMEPLATE_PENDING_PATH") {
            redirects.pending_path = validate_path("HOMEPLATE_PENDING_PATH", path)?;
        }

        Ok(Self {
            backend,
            resolver,
            redirects,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

impl BackendConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_required_env("HOMEPLATE_BACKEND_URL")?;
        let base_url = Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("HOMEPLATE_BACKEND_URL".to_string(), e.to_string())
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEnvVar(
                "HOMEPLATE_BACKEND_URL".to_string(),
                format!("unsupported scheme '{}'", base_url.scheme()),
            ));
        }

        Ok(Self {
            base_url,
            api_key: get_validated_secret("HOMEPLATE_BACKEND_KEY")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to a default when unset.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Bound the role cache lifetime; the cache rejects very long lifetimes.
fn cache_ttl_from_secs(secs: u64) -> Result<Duration, ConfigError> {
    if secs > MAX_CACHE_TTL_SECS {
        return Err(ConfigError::InvalidEnvVar(
            "HOMEPLATE_ROLE_CACHE_TTL_SECS".to_string(),
            format!("must be at most {MAX_CACHE_TTL_SECS}"),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Redirect targets must be absolute in-app paths.
fn validate_path(key: &str, path: String) -> Result<String, ConfigError> {
    if path.starts_with('/') && !path.starts_with("//") {
        Ok(path)
    } else {
        Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("'{path}' must be an absolute path starting with a single '/'"),
        ))
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
    let len = s.chars().count() as f64;
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
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Copy the key from the backend dashboard."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

impl BackendConfig {
    /// Build a backend config directly, skipping environment validation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `base_url` does not parse.
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("base_url".to_string(), e.to_string()))?;
        Ok(Self {
            base_url,
            api_key: SecretString::from(api_key.into()),
        })
    }

    /// The API key, for building request headers.
    pub(crate) fn expose_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}
