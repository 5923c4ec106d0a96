//! Application configuration, read from the environment (and `.env`).

use chrono_tz::Tz;
use std::time::Duration;

use crate::db::DbConfig;

/// Default JWT secret; production refuses to start with it.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub site_timezone: Tz,
    pub auth: AuthConfig,
    pub database: Option<DbConfig>,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub admin_email: String,
    /// bcrypt hash of the fallback admin password
    pub admin_password_hash: String,
    pub session_minutes: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsConfig {
    /// Remote page-view ingestion endpoint. Unset means page views go
    /// straight into the store.
    pub endpoint: Option<String>,
    pub refresh_interval: Option<Duration>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let admin_password_hash = if let Ok(hash) = std::env::var("ADMIN_HASH_PASSWORD") {
            hash
        } else {
            let plain = env_or("ADMIN_PASSWORD", "admin123");
            bcrypt::hash(plain, bcrypt::DEFAULT_COST).unwrap_or_default()
        };

        Self {
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            admin_email: env_or("ADMIN_EMAIL", "admin@example.com"),
            admin_password_hash,
            session_minutes: env_parse("SESSION_MINUTES").unwrap_or(60 * 8),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let site_timezone = match std::env::var("SITE_TIMEZONE") {
            Ok(name) => name.parse::<Tz>().unwrap_or_else(|_| {
                tracing::warn!(timezone = %name, "unknown SITE_TIMEZONE, using Asia/Seoul");
                chrono_tz::Asia::Seoul
            }),
            Err(_) => chrono_tz::Asia::Seoul,
        };

        Self {
            host: env_or("HOST", "127.0.0.1"),
            port: env_parse("PORT").unwrap_or(3001),
            environment: env_or("ENVIRONMENT", "development"),
            site_timezone,
            auth: AuthConfig::from_env(),
            database: std::env::var("DATABASE_URL")
                .is_ok()
                .then(DbConfig::default),
            analytics: AnalyticsConfig {
                endpoint: std::env::var("ANALYTICS_ENDPOINT")
                    .ok()
                    .filter(|s| !s.trim().is_empty()),
                refresh_interval: env_parse::<u64>("ANALYTICS_REFRESH_SECS")
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            },
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Settings that must never reach production.
    pub fn insecure_defaults(&self) -> Vec<&'static str> {
        let mut issues = Vec::new();
        if self.auth.jwt_secret.is_empty() || self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            issues.push("JWT_SECRET");
        }
        if self.auth.admin_email == "admin@example.com" {
            issues.push("ADMIN_EMAIL");
        }
        issues
    }
}

#[cfg(test)]
impl AppConfig {
    /// Deterministic config for tests: fixed secret, known admin password.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            site_timezone: chrono_tz::Asia::Seoul,
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                admin_email: "admin@taxin.test".to_string(),
                admin_password_hash: bcrypt::hash("correct-horse", 4).unwrap(),
                session_minutes: 30,
            },
            database: None,
            analytics: AnalyticsConfig::default(),
        }
    }
}
