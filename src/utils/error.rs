use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP {status} from {url}")]
    Http {
        url: String,
        status: u16,
        body: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Record {id} not found")]
    NotFound { id: u64 },

    #[error("Batch size {size} exceeds maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Record store error: {message}")]
    Store { message: String },

    #[error("An ETL run is already in progress")]
    RunInProgress,

    #[error("ETL task failed: {message}")]
    TaskFailed { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Protocol,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    /// 可重試的錯誤：網路層失敗或 5xx 回應
    pub fn is_transient(&self) -> bool {
        match self {
            EtlError::Http { status, .. } => *status >= 500,
            EtlError::Network(e) => !(e.is_decode() || e.is_builder()),
            _ => false,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            EtlError::Http { status, .. } => Some(*status),
            EtlError::NotFound { .. } => Some(404),
            EtlError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Short, stable name used as the error kind in audit events.
    pub fn kind_name(&self) -> &'static str {
        match self {
            EtlError::Http { .. } => "HttpError",
            EtlError::Network(e) if e.is_timeout() => "Timeout",
            EtlError::Network(_) => "NetworkError",
            EtlError::NotFound { .. } => "NotFound",
            EtlError::BatchTooLarge { .. } => "BatchTooLarge",
            EtlError::UnexpectedResponse { .. } => "UnexpectedResponse",
            EtlError::IoError(_) => "IoError",
            EtlError::SerializationError(_) => "SerializationError",
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => "ConfigError",
            EtlError::Store { .. } => "StoreError",
            EtlError::RunInProgress => "RunInProgress",
            EtlError::TaskFailed { .. } => "TaskFailed",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::Network(_) => ErrorCategory::Network,
            EtlError::Http { status, .. } if *status >= 500 => ErrorCategory::Network,
            EtlError::Http { .. } | EtlError::BatchTooLarge { .. } => ErrorCategory::Protocol,
            EtlError::NotFound { .. }
            | EtlError::UnexpectedResponse { .. }
            | EtlError::SerializationError(_) => ErrorCategory::Data,
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_)
            | EtlError::Store { .. }
            | EtlError::RunInProgress
            | EtlError::TaskFailed { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data => ErrorSeverity::Low,
            ErrorCategory::Protocol => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EtlError::Http { status, url, .. } => {
                format!("The API at {} answered with HTTP {}", url, status)
            }
            EtlError::Network(e) if e.is_timeout() => {
                "The API did not answer before the request timed out".to_string()
            }
            EtlError::Network(_) => "Could not reach the API".to_string(),
            EtlError::NotFound { id } => format!("Record {} does not exist on the source API", id),
            EtlError::BatchTooLarge { size, max } => {
                format!("Tried to send {} records in one batch (limit {})", size, max)
            }
            EtlError::RunInProgress => "Another ETL run is still active".to_string(),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check that the source and sink APIs are up, then run again",
            ErrorCategory::Protocol => "Check the base URL and the API version the service exposes",
            ErrorCategory::Data => "Inspect the offending record on the source API",
            ErrorCategory::Configuration => "Fix the configuration file or command line flags",
            ErrorCategory::System => "Check the logs for the underlying failure",
        }
    }
}
