use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub production: bool,
    pub level: LogLevel,
    /// Directory for the rolling log files
    pub directory: String,
}

impl LoggingConfig {
    /// `LOG_LEVEL` wins; otherwise `info` in production and `debug` elsewhere.
    pub fn from_env() -> Self {
        let production = std::env::var("ENVIRONMENT").as_deref() == Ok("production");
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(if production {
                LogLevel::Info
            } else {
                LogLevel::Debug
            });

        Self {
            production,
            level,
            directory: std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        }
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!(
            "taxin_backend={},tower_http=debug,axum=debug,sqlx=warn",
            self.level
        )
    }
}
