//! Recovery telemetry

use crate::error::{ErrorContext, ErrorReporter, ErrorSeverity, RecoveryError};
use crate::error_recovery::strategy::RecoveryStrategy;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

/// Action name attached to every recovery record
pub const RECOVERY_ACTION: &str = "error-recovery";

/// Level of a telemetry record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryLevel {
    Info,
    Warning,
    Error,
}

impl From<TelemetryLevel> for ErrorSeverity {
    fn from(level: TelemetryLevel) -> Self {
        match level {
            TelemetryLevel::Info => ErrorSeverity::Info,
            TelemetryLevel::Warning => ErrorSeverity::Warning,
            TelemetryLevel::Error => ErrorSeverity::Error,
        }
    }
}

/// One record per recovery execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub component: String,
    pub action: &'static str,
    pub level: TelemetryLevel,
    pub strategy: RecoveryStrategy,
    pub success: bool,
    pub retry_count: u32,
}

/// Sink for recovery telemetry
pub trait Telemetry: Send + Sync {
    fn log_error(&self, error: &RecoveryError, record: &TelemetryRecord);
}

/// Forward a record, swallowing any panic raised by the sink
pub(crate) fn emit(telemetry: &dyn Telemetry, error: &RecoveryError, record: &TelemetryRecord) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| telemetry.log_error(error, record)));
    if outcome.is_err() {
        tracing::error!(component = %record.component, "Telemetry sink panicked");
    }
}

/// Telemetry written as structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn log_error(&self, error: &RecoveryError, record: &TelemetryRecord) {
        let context = ErrorContext::new(error.to_error_code(), &record.component, record.action)
            .with_metadata("strategy", record.strategy.as_str())
            .with_metadata("success", record.success)
            .with_metadata("retry_count", record.retry_count)
            .with_correlation_id(uuid::Uuid::new_v4().to_string());

        ErrorReporter::log_with_severity(error, Some(context), record.level.into());
    }
}
