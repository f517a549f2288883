use std::env;
use std::time::Duration;

use axum::http::HeaderValue;
use chrono::TimeDelta;
use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::services::{revocation::InMemoryRevocationStore, token::SigningContext};

/// Startup configuration failures. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required env var: {0}")]
    Missing(&'static str),

    #[error("Env var {0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Unsupported JWT algorithm {0:?} (expected HS256, HS384 or HS512)")]
    UnsupportedAlgorithm(String),
}

/// How superseded refresh tokens are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTracking {
    Database,
    Redis,
    Memory,
    /// Stateless refresh tokens: rotation cannot detect reuse.
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigins {
    Any,
    List(Vec<HeaderValue>),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_alg: Algorithm,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub refresh_tracking: RefreshTracking,
    pub startup_probe_timeout: Duration,
    pub revocation_timeout: Duration,
    /// Upper bound on records held by the in-memory revocation store.
    pub revocation_cache_capacity: u64,
    pub cors_origins: CorsOrigins,
    pub backend_base_url: Option<String>,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` is this over the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_alg = parse_algorithm(optional("JWT_ALG").as_deref().unwrap_or("HS256"))?;

        let refresh_tracking = match optional("REFRESH_TOKEN_TRACKING").as_deref() {
            None | Some("database") => RefreshTracking::Database,
            Some("redis") => RefreshTracking::Redis,
            Some("memory") => RefreshTracking::Memory,
            Some("disabled") => RefreshTracking::Disabled,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "REFRESH_TOKEN_TRACKING",
                    value: other.to_string(),
                })
            }
        };

        let redis_url = optional("REDIS_URL");
        if refresh_tracking == RefreshTracking::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        Ok(Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            redis_url,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            jwt_alg,
            access_token_expire_minutes: lifetime(
                &optional,
                "ACCESS_TOKEN_EXPIRE_MINUTES",
                15,
                TimeDelta::try_minutes,
            )?,
            refresh_token_expire_days: lifetime(
                &optional,
                "REFRESH_TOKEN_EXPIRE_DAYS",
                30,
                TimeDelta::try_days,
            )?,
            refresh_tracking,
            startup_probe_timeout: Duration::from_secs(
                positive(&optional, "STARTUP_PROBE_TIMEOUT_SECS", 5)? as u64,
            ),
            revocation_timeout: Duration::from_millis(
                positive(&optional, "REVOCATION_TIMEOUT_MS", 2000)? as u64,
            ),
            revocation_cache_capacity: positive(
                &optional,
                "REVOCATION_CACHE_CAPACITY",
                InMemoryRevocationStore::DEFAULT_CAPACITY as i64,
            )? as u64,
            cors_origins: parse_cors_origins(optional("CORS_ORIGINS").as_deref().unwrap_or("*"))?,
            backend_base_url: optional("BACKEND_BASE_URL"),
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: match optional("PORT") {
                Some(v) => v.parse().map_err(|_| ConfigError::Invalid { key: "PORT", value: v })?,
                None => 8080,
            },
        })
    }

    pub fn signing_context(&self) -> Result<SigningContext, ConfigError> {
        let access_ttl = TimeDelta::try_minutes(self.access_token_expire_minutes).ok_or(ConfigError::Invalid {
            key: "ACCESS_TOKEN_EXPIRE_MINUTES",
            value: self.access_token_expire_minutes.to_string(),
        })?;
        let refresh_ttl = TimeDelta::try_days(self.refresh_token_expire_days).ok_or(ConfigError::Invalid {
            key: "REFRESH_TOKEN_EXPIRE_DAYS",
            value: self.refresh_token_expire_days.to_string(),
        })?;
        SigningContext::new(self.jwt_secret.as_bytes(), self.jwt_alg, access_ttl, refresh_ttl)
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or(ConfigError::Missing(key))?;
    if value.trim().is_empty() {
        return Err(ConfigError::Empty(key));
    }
    Ok(value)
}

fn positive<F>(optional: &F, key: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = optional(key) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(ConfigError::Invalid { key, value: raw }),
    }
}

/// A positive count that must also convert to a representable duration.
fn lifetime<F>(
    optional: &F,
    key: &'static str,
    default: i64,
    to_delta: fn(i64) -> Option<TimeDelta>,
) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = positive(optional, key, default)?;
    match to_delta(value) {
        Some(_) => Ok(value),
        None => Err(ConfigError::Invalid { key, value: value.to_string() }),
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    match name.parse::<Algorithm>() {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        _ => Err(ConfigError::UnsupportedAlgorithm(name.to_string())),
    }
}

fn parse_cors_origins(raw: &str) -> Result<CorsOrigins, ConfigError> {
    if raw == "*" {
        return Ok(CorsOrigins::Any);
    }
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| {
            HeaderValue::from_str(o).map_err(|_| ConfigError::Invalid {
                key: "CORS_ORIGINS",
                value: o.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if origins.is_empty() {
        Ok(CorsOrigins::Any)
    } else {
        Ok(CorsOrigins::List(origins))
    }
}
