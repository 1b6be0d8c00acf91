//! Process configuration, read once from the environment at startup.

use chrono::Duration;
use thiserror::Error;

use keygate_auth::token::{DEFAULT_ACCESS_TTL_MINUTES, DEFAULT_REFRESH_TTL_DAYS, MIN_SIGNING_KEY_BYTES};
use keygate_auth::{HasherSettings, TokenError, TokenSettings};

const DEV_JWT_SECRET: &str = "keygate-insecure-development-signing-key";
const DEV_ADMIN_EMAIL: &str = "admin@example.com";
const DEV_ADMIN_PASSWORD: &str = "Admin123!";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Administrator ensured at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedAdmin {
    pub email: String,
    pub password: String,
}

impl core::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable after startup; passed explicitly to whatever needs it.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub hasher: HasherSettings,
    pub seed_admin: Option<SeedAdmin>,
}

impl Default for AppConfig {
    /// Development defaults: in-memory stores and a seeded `admin@example.com`.
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_issuer: "keygate".to_string(),
            jwt_audience: "keygate-clients".to_string(),
            access_token_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TTL_DAYS,
            use_persistent_stores: false,
            database_url: None,
            hasher: HasherSettings::default(),
            seed_admin: Some(SeedAdmin {
                email: DEV_ADMIN_EMAIL.to_string(),
                password: DEV_ADMIN_PASSWORD.to_string(),
            }),
        }
    }
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .field("use_persistent_stores", &self.use_persistent_stores)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("hasher", &self.hasher)
            .field("seed_admin", &self.seed_admin)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) if secret.len() < MIN_SIGNING_KEY_BYTES => {
                return Err(ConfigError::Invalid {
                    var: "JWT_SECRET",
                    reason: format!("must be at least {MIN_SIGNING_KEY_BYTES} bytes"),
                });
            }
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                defaults.jwt_secret
            }
        };

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
            None => false,
        };
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let hasher = HasherSettings {
            memory_kib: parse_or("ARGON2_MEMORY_KIB", get("ARGON2_MEMORY_KIB"), defaults.hasher.memory_kib)?,
            iterations: parse_or("ARGON2_ITERATIONS", get("ARGON2_ITERATIONS"), defaults.hasher.iterations)?,
            ..defaults.hasher
        };

        let seed_admin = match (get("SEED_ADMIN_EMAIL"), get("SEED_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(SeedAdmin { email, password }),
            (Some(_), None) => return Err(ConfigError::Missing("SEED_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("SEED_ADMIN_EMAIL")),
            // Persistent deployments never get the well-known dev password.
            (None, None) if use_persistent_stores => None,
            (None, None) => defaults.seed_admin,
        };

        let config = Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret,
            jwt_issuer: get("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            jwt_audience: get("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            access_token_minutes: parse_or(
                "ACCESS_TOKEN_MINUTES",
                get("ACCESS_TOKEN_MINUTES"),
                defaults.access_token_minutes,
            )?,
            refresh_token_days: parse_or("REFRESH_TOKEN_DAYS", get("REFRESH_TOKEN_DAYS"), defaults.refresh_token_days)?,
            use_persistent_stores,
            database_url,
            hasher,
            seed_admin,
        };

        // Surface lifetime problems now rather than at first login.
        config.token_settings()?;
        Ok(config)
    }

    pub fn token_settings(&self) -> Result<TokenSettings, ConfigError> {
        let invalid = |var: &'static str| move |e: TokenError| ConfigError::Invalid { var, reason: e.to_string() };

        TokenSettings::new(self.jwt_secret.as_bytes(), self.jwt_issuer.clone(), self.jwt_audience.clone())
            .map_err(invalid("JWT_SECRET"))?
            .with_access_ttl(Duration::minutes(self.access_token_minutes))
            .map_err(invalid("ACCESS_TOKEN_MINUTES"))?
            .with_refresh_ttl(Duration::days(self.refresh_token_days))
            .map_err(invalid("REFRESH_TOKEN_DAYS"))
    }
}

fn parse_or<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
