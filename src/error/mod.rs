use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Reasoning service (advisor) errors
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("Advisor unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AdvisorError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AdvisorError::Timeout { .. } | AdvisorError::Http(_) => true,
            AdvisorError::Api { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            AdvisorError::InvalidResponse { .. } => true,
            AdvisorError::Unavailable { .. } => false,
        }
    }
}

/// Knowledge source errors
#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge domain not found: {domain}")]
    NotFound { domain: String },

    #[error("Knowledge source I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Knowledge bundle is malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Step dispatch errors. These never halt a session.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("Ordering violation in {step}: {reason}")]
    OrderingViolation { step: String, reason: String },
}

impl StepError {
    pub(crate) fn ordering(step: &str, reason: impl Into<String>) -> Self {
        StepError::OrderingViolation {
            step: step.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for advisor calls
pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Result type alias for knowledge retrieval
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

/// Result type alias for step functions
pub type StepResult<T> = Result<T, StepError>;
