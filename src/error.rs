//! Error types for the resilience engine
//!
//! Every failure that flows through the engine, whether produced by a caller's
//! retry function or by the engine itself, is a [`RecoveryError`]. Errors carry
//! structured codes, a severity, and can be reported as structured tracing
//! events through [`ErrorReporter`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Failures handled by the recovery engine
#[derive(Error, Debug)]
pub enum RecoveryError {
    /// A response was received with an error status
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Generic network failure (no response received)
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The host reported that it has no connectivity
    #[error("Offline: {0}")]
    Offline(String),

    /// Name resolution failures
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// Certificate / TLS handshake failures
    #[error("TLS error: {0}")]
    Tls(String),

    /// Request blocked by a cross-origin policy
    #[error("Blocked by CORS policy: {0}")]
    Cors(String),

    /// A failure raised while rendering or updating a component
    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },

    /// The circuit breaker for a key refused the attempt
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),

    /// The offline queue rejected a request
    #[error("Offline queue error: {0}")]
    Queue(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pending operation was cancelled by its caller
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// A retry function panicked
    #[error("Operation panicked: {0}")]
    Panicked(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RecoveryError {
    fn from(err: config::ConfigError) -> Self {
        RecoveryError::Config(err.to_string())
    }
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Network errors (1000-1099)
    NetworkUnreachable,
    ConnectionTimeout,
    Offline,
    DnsFailure,
    TlsFailure,
    CorsBlocked,

    // HTTP errors (1100-1199)
    ClientError,
    ServerError,
    RateLimitExceeded,
    Unauthorized,
    Forbidden,
    NotFound,

    // Component errors (1200-1299)
    ComponentFailure,

    // Recovery errors (1300-1399)
    CircuitOpen,
    QueueRejected,
    Cancelled,

    // Configuration errors (1400-1499)
    ConfigurationInvalid,

    // Internal errors (1900-1999)
    InternalError,
    Panicked,
    ParsingFailed,
    IoFailure,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::NetworkUnreachable => 1001,
            ErrorCode::ConnectionTimeout => 1002,
            ErrorCode::Offline => 1003,
            ErrorCode::DnsFailure => 1004,
            ErrorCode::TlsFailure => 1005,
            ErrorCode::CorsBlocked => 1006,

            ErrorCode::ClientError => 1101,
            ErrorCode::ServerError => 1102,
            ErrorCode::RateLimitExceeded => 1103,
            ErrorCode::Unauthorized => 1104,
            ErrorCode::Forbidden => 1105,
            ErrorCode::NotFound => 1106,

            ErrorCode::ComponentFailure => 1201,

            ErrorCode::CircuitOpen => 1301,
            ErrorCode::QueueRejected => 1302,
            ErrorCode::Cancelled => 1303,

            ErrorCode::ConfigurationInvalid => 1401,

            ErrorCode::InternalError => 1901,
            ErrorCode::Panicked => 1902,
            ErrorCode::ParsingFailed => 1903,
            ErrorCode::IoFailure => 1904,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "network",
            1100..=1199 => "http",
            1200..=1299 => "component",
            1300..=1399 => "recovery",
            1400..=1499 => "configuration",
            _ => "internal",
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Low severity - information only
    Info,
    /// Medium severity - warning condition
    Warning,
    /// High severity - error condition
    Error,
    /// Critical severity - immediate attention required
    Critical,
}

/// Structured error context with additional metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Component (recovery key) that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional metadata about the error
    pub metadata: HashMap<String, serde_json::Value>,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Request/session ID for correlation
    pub correlation_id: Option<String>,
}

impl ErrorContext {
    /// Create new error context
    pub fn new(code: ErrorCode, component: &str, operation: &str) -> Self {
        Self {
            code,
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
            timestamp: chrono::Utc::now(),
            correlation_id: None,
        }
    }

    /// Add metadata to error context
    pub fn with_metadata<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set correlation ID for request tracking
    pub fn with_correlation_id<S: Into<String>>(mut self, id: S) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Error representation for structured logging
#[derive(Debug, Clone, Serialize)]
pub struct StructuredError {
    /// Error code for machine processing
    pub code: ErrorCode,
    /// Numeric error code
    pub code_number: u32,
    /// Error category
    pub category: &'static str,
    /// Error message
    pub message: String,
    /// Whether this error is retryable
    pub is_retryable: bool,
    /// Component that generated the error
    pub component: String,
    /// Operation that was being performed
    pub operation: String,
    /// Additional context metadata
    pub metadata: HashMap<String, serde_json::Value>,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Timestamp when error occurred
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Request/session ID for correlation
    pub correlation_id: Option<String>,
}

impl RecoveryError {
    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Http {
            status,
            message: msg.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an offline error
    pub fn offline<S: Into<String>>(msg: S) -> Self {
        Self::Offline(msg.into())
    }

    /// Create a DNS error
    pub fn dns<S: Into<String>>(msg: S) -> Self {
        Self::Dns(msg.into())
    }

    /// Create a TLS error
    pub fn tls<S: Into<String>>(msg: S) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a CORS error
    pub fn cors<S: Into<String>>(msg: S) -> Self {
        Self::Cors(msg.into())
    }

    /// Create a component error
    pub fn component<C: Into<String>, S: Into<String>>(component: C, msg: S) -> Self {
        Self::Component {
            component: component.into(),
            message: msg.into(),
        }
    }

    /// Create a circuit-open error
    pub fn circuit_open<S: Into<String>>(key: S) -> Self {
        Self::CircuitOpen(key.into())
    }

    /// Create a queue error
    pub fn queue<S: Into<String>>(msg: S) -> Self {
        Self::Queue(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Generic(anyhow::anyhow!(msg.into()))
    }

    /// The bare message, without the variant prefix added by `Display`
    pub fn message(&self) -> String {
        match self {
            RecoveryError::Http { message, .. } => message.clone(),
            RecoveryError::Component { message, .. } => message.clone(),
            RecoveryError::Network(msg)
            | RecoveryError::Timeout(msg)
            | RecoveryError::Offline(msg)
            | RecoveryError::Dns(msg)
            | RecoveryError::Tls(msg)
            | RecoveryError::Cors(msg)
            | RecoveryError::CircuitOpen(msg)
            | RecoveryError::Queue(msg)
            | RecoveryError::Config(msg)
            | RecoveryError::Cancelled(msg)
            | RecoveryError::Panicked(msg) => msg.clone(),
            RecoveryError::Json(e) => e.to_string(),
            RecoveryError::Io(e) => e.to_string(),
            RecoveryError::Generic(e) => e.to_string(),
        }
    }

    /// Whether the failure happened at the transport level
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RecoveryError::Http { .. }
                | RecoveryError::Network(_)
                | RecoveryError::Timeout(_)
                | RecoveryError::Offline(_)
                | RecoveryError::Dns(_)
                | RecoveryError::Tls(_)
                | RecoveryError::Cors(_)
        )
    }

    /// Whether the failure was raised by a component
    pub fn is_component(&self) -> bool {
        matches!(self, RecoveryError::Component { .. })
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            RecoveryError::Http { status, .. } => *status >= 500 || *status == 429,
            RecoveryError::Network(_)
            | RecoveryError::Timeout(_)
            | RecoveryError::Offline(_)
            | RecoveryError::Dns(_) => true,
            _ => false,
        }
    }

    /// Map RecoveryError to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            RecoveryError::Http { status, .. } => match *status {
                401 => ErrorCode::Unauthorized,
                403 => ErrorCode::Forbidden,
                404 => ErrorCode::NotFound,
                429 => ErrorCode::RateLimitExceeded,
                s if s >= 500 => ErrorCode::ServerError,
                _ => ErrorCode::ClientError,
            },
            RecoveryError::Network(_) => ErrorCode::NetworkUnreachable,
            RecoveryError::Timeout(_) => ErrorCode::ConnectionTimeout,
            RecoveryError::Offline(_) => ErrorCode::Offline,
            RecoveryError::Dns(_) => ErrorCode::DnsFailure,
            RecoveryError::Tls(_) => ErrorCode::TlsFailure,
            RecoveryError::Cors(_) => ErrorCode::CorsBlocked,
            RecoveryError::Component { .. } => ErrorCode::ComponentFailure,
            RecoveryError::CircuitOpen(_) => ErrorCode::CircuitOpen,
            RecoveryError::Queue(_) => ErrorCode::QueueRejected,
            RecoveryError::Cancelled(_) => ErrorCode::Cancelled,
            RecoveryError::Config(_) => ErrorCode::ConfigurationInvalid,
            RecoveryError::Panicked(_) => ErrorCode::Panicked,
            RecoveryError::Json(_) => ErrorCode::ParsingFailed,
            RecoveryError::Io(_) => ErrorCode::IoFailure,
            RecoveryError::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RecoveryError::Panicked(_) => ErrorSeverity::Critical,
            RecoveryError::Config(_) | RecoveryError::Component { .. } => ErrorSeverity::Error,
            RecoveryError::Http { status, .. } if *status >= 500 => ErrorSeverity::Error,
            RecoveryError::Cancelled(_) => ErrorSeverity::Info,
            _ if self.is_network() => ErrorSeverity::Warning,
            RecoveryError::CircuitOpen(_) | RecoveryError::Queue(_) => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Create a structured error from this RecoveryError
    pub fn to_structured_error(&self, context: Option<ErrorContext>) -> StructuredError {
        let error_code = self.to_error_code();
        let base_context =
            context.unwrap_or_else(|| ErrorContext::new(error_code, "unknown", "unknown"));

        StructuredError {
            code: error_code,
            code_number: error_code.as_number(),
            category: error_code.category(),
            message: self.to_string(),
            is_retryable: self.is_retryable(),
            component: base_context.component,
            operation: base_context.operation,
            metadata: base_context.metadata,
            severity: self.severity(),
            timestamp: base_context.timestamp,
            correlation_id: base_context.correlation_id,
        }
    }
}

/// Error logging and reporting utilities
pub struct ErrorReporter;

impl ErrorReporter {
    /// Log a structured error with its own severity
    pub fn log_error(error: &RecoveryError, context: Option<ErrorContext>) {
        let severity = error.severity();
        Self::log_with_severity(error, context, severity);
    }

    /// Log a structured error at an explicit severity
    pub fn log_with_severity(
        error: &RecoveryError,
        context: Option<ErrorContext>,
        severity: ErrorSeverity,
    ) {
        let structured = error.to_structured_error(context);
        let metadata = serde_json::Value::Object(structured.metadata.into_iter().collect());

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                tracing::error!(
                    error_code = structured.code_number,
                    category = structured.category,
                    component = %structured.component,
                    operation = %structured.operation,
                    correlation_id = ?structured.correlation_id,
                    metadata = %metadata,
                    "{}",
                    structured.message
                );
            }
            ErrorSeverity::Warning => {
                tracing::warn!(
                    error_code = structured.code_number,
                    category = structured.category,
                    component = %structured.component,
                    operation = %structured.operation,
                    correlation_id = ?structured.correlation_id,
                    metadata = %metadata,
                    "{}",
                    structured.message
                );
            }
            ErrorSeverity::Info => {
                tracing::info!(
                    error_code = structured.code_number,
                    category = structured.category,
                    component = %structured.component,
                    operation = %structured.operation,
                    correlation_id = ?structured.correlation_id,
                    metadata = %metadata,
                    "{}",
                    structured.message
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let cases = vec![
            (401, ErrorCode::Unauthorized),
            (403, ErrorCode::Forbidden),
            (404, ErrorCode::NotFound),
            (429, ErrorCode::RateLimitExceeded),
            (418, ErrorCode::ClientError),
            (503, ErrorCode::ServerError),
        ];

        for (status, expected) in cases {
            assert_eq!(RecoveryError::http(status, "x").to_error_code(), expected);
        }
    }

    #[test]
    fn test_message_strips_prefix() {
        let error = RecoveryError::network("Network Error");
        assert_eq!(error.to_string(), "Network error: Network Error");
        assert_eq!(error.message(), "Network Error");

        let error = RecoveryError::component("Chart", "render failed");
        assert_eq!(error.message(), "render failed");
    }

    #[test]
    fn test_classification_helpers() {
        assert!(RecoveryError::timeout("slow").is_network());
        assert!(RecoveryError::http(500, "boom").is_retryable());
        assert!(!RecoveryError::http(404, "gone").is_retryable());
        assert!(RecoveryError::component("List", "oops").is_component());
        assert!(!RecoveryError::internal("bug").is_network());
    }

    #[test]
    fn test_structured_error() {
        let context = ErrorContext::new(ErrorCode::ServerError, "profile", "error-recovery")
            .with_metadata("strategy", "RetryWithBackoff")
            .with_correlation_id("abc");
        let structured = RecoveryError::http(502, "bad gateway").to_structured_error(Some(context));

        assert_eq!(structured.code_number, 1102);
        assert_eq!(structured.category, "http");
        assert_eq!(structured.component, "profile");
        assert_eq!(structured.correlation_id.as_deref(), Some("abc"));
        assert_eq!(structured.severity, ErrorSeverity::Error);
        assert!(structured.is_retryable);
    }
}
