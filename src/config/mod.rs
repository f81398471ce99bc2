use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub advisor: AdvisorConfig,
    pub request: RequestConfig,
    pub session: SessionConfig,
    pub knowledge: KnowledgeConfig,
    pub logging: LoggingConfig,
}

/// Advisor pipe API configuration
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub api_key: String,
    pub base_url: String,
    pub pipe: String,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Per-session ceilings and routing knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_iterations: u32,
    pub wall_clock_secs: u64,
    /// Priority at which an open question overrides an advisor that wants
    /// to stop collecting evidence.
    pub routing_priority_threshold: f64,
}

/// Knowledge bundle location
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let advisor = AdvisorConfig {
            api_key: env::var("ADVISOR_API_KEY").map_err(|_| AppError::Config {
                message: "ADVISOR_API_KEY is required".to_string(),
            })?,
            base_url: env::var("ADVISOR_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            pipe: env::var("ADVISOR_PIPE").unwrap_or_else(|_| "forecast-advisor-v1".to_string()),
        };

        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", 30000),
            max_retries: parse_env("MAX_RETRIES", 3),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", 1000),
        };

        let session = SessionConfig {
            max_iterations: parse_env("SESSION_MAX_ITERATIONS", 10),
            wall_clock_secs: parse_env("SESSION_WALL_CLOCK_SECS", 300),
            routing_priority_threshold: parse_env("ROUTING_PRIORITY_THRESHOLD", 0.7_f64)
                .clamp(0.0, 1.0),
        };

        if session.max_iterations == 0 {
            return Err(AppError::Config {
                message: "SESSION_MAX_ITERATIONS must be at least 1".to_string(),
            });
        }

        let knowledge = KnowledgeConfig {
            path: PathBuf::from(
                env::var("KNOWLEDGE_PATH").unwrap_or_else(|_| "./data/knowledge.json".to_string()),
            ),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            advisor,
            request,
            session,
            knowledge,
            logging,
        })
    }
}

impl RequestConfig {
    /// Per-call timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl SessionConfig {
    /// Wall-clock ceiling as a [`Duration`].
    pub fn wall_clock(&self) -> Duration {
        Duration::from_secs(self.wall_clock_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            wall_clock_secs: 300,
            routing_priority_threshold: 0.7,
        }
    }
}
